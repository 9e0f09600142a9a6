use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseTransaction, EntityTrait, IntoActiveModel, QueryFilter, Select, Value,
};
use tracing::debug;
use uuid::Uuid;

use super::TenantContext;
use crate::errors::ServiceError;

/// Describes how an entity is keyed and scoped.
///
/// Implemented by every table the engine touches. Tables without a
/// `company_id` column are scoped by tenant only.
pub trait TenantScoped: EntityTrait {
    /// Human-readable name used in error messages.
    const LABEL: &'static str;

    fn id_column() -> Self::Column;

    fn tenant_column() -> Self::Column;

    fn company_column() -> Option<Self::Column> {
        None
    }

    /// Optimistic concurrency column, bumped on every gateway update.
    fn version_column() -> Option<Self::Column> {
        None
    }
}

/// Gateway bound to a database transaction.
pub type TxGateway<'a> = TenantGateway<'a, DatabaseTransaction>;

/// The only data-access path used by services.
///
/// Every query it executes carries the tenant (and company) filter of its
/// context, and every row it inserts is stamped with them. Callers cannot
/// override either: scoped columns are reset before updates.
pub struct TenantGateway<'a, C: ConnectionTrait> {
    conn: &'a C,
    ctx: &'a TenantContext,
}

impl<'a, C: ConnectionTrait> TenantGateway<'a, C> {
    pub fn new(conn: &'a C, ctx: &'a TenantContext) -> Self {
        Self { conn, ctx }
    }

    pub fn context(&self) -> &TenantContext {
        self.ctx
    }

    fn condition<E: TenantScoped>(&self) -> Condition {
        let condition = Condition::all().add(E::tenant_column().eq(self.ctx.tenant_id()));
        match E::company_column() {
            Some(column) => condition.add(column.eq(self.ctx.company_id())),
            None => condition,
        }
    }

    fn not_found<E: TenantScoped>(id: Uuid) -> ServiceError {
        ServiceError::NotFound(format!("{} {} not found", E::LABEL, id))
    }

    /// Adds the tenant filter to an arbitrary select.
    pub fn scope<E: TenantScoped>(&self, select: Select<E>) -> Select<E> {
        select.filter(self.condition::<E>())
    }

    pub async fn all<E: TenantScoped>(&self, select: Select<E>) -> Result<Vec<E::Model>, ServiceError> {
        self.scope(select)
            .all(self.conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn one<E: TenantScoped>(
        &self,
        select: Select<E>,
    ) -> Result<Option<E::Model>, ServiceError> {
        self.scope(select)
            .one(self.conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn find<E: TenantScoped>(&self, id: Uuid) -> Result<Option<E::Model>, ServiceError> {
        self.one(E::find().filter(E::id_column().eq(id))).await
    }

    /// Like [`find`](Self::find), but absent and foreign rows are `NotFound`.
    pub async fn get<E: TenantScoped>(&self, id: Uuid) -> Result<E::Model, ServiceError> {
        self.find::<E>(id)
            .await?
            .ok_or_else(|| Self::not_found::<E>(id))
    }

    pub async fn insert<E, A>(&self, mut model: A) -> Result<E::Model, ServiceError>
    where
        E: TenantScoped,
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + 'a,
        E::Model: IntoActiveModel<A>,
    {
        model.set(E::tenant_column(), Value::from(self.ctx.tenant_id()));
        if let Some(column) = E::company_column() {
            model.set(column, Value::from(self.ctx.company_id()));
        }

        model
            .insert(self.conn)
            .await
            .map_err(|err| match ServiceError::db_error(err) {
                ServiceError::Conflict(detail) => {
                    ServiceError::Conflict(format!("{} already exists ({})", E::LABEL, detail))
                }
                other => other,
            })
    }

    /// Writes the `Set` fields of `model` to the row `id`.
    ///
    /// When the entity is versioned and `expected_version` is given, the write
    /// only lands if the stored version still matches, and the version is
    /// bumped. A lost race surfaces as `ConcurrentModification`; a missing or
    /// foreign row as `NotFound`.
    pub async fn update<E, A>(
        &self,
        id: Uuid,
        mut model: A,
        expected_version: Option<i32>,
    ) -> Result<E::Model, ServiceError>
    where
        E: TenantScoped,
        A: ActiveModelTrait<Entity = E> + Send,
    {
        model.not_set(E::id_column());
        model.not_set(E::tenant_column());
        if let Some(column) = E::company_column() {
            model.not_set(column);
        }

        let mut query = E::update_many()
            .filter(self.condition::<E>())
            .filter(E::id_column().eq(id));

        if let (Some(column), Some(version)) = (E::version_column(), expected_version) {
            model.set(column, Value::from(version + 1));
            query = query.filter(column.eq(version));
        }

        let result = query
            .set(model)
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return match self.find::<E>(id).await? {
                None => Err(Self::not_found::<E>(id)),
                Some(_) => {
                    debug!(entity = E::LABEL, %id, "version check failed");
                    Err(ServiceError::ConcurrentModification(format!(
                        "{} {} was modified concurrently",
                        E::LABEL,
                        id
                    )))
                }
            };
        }

        self.get::<E>(id).await
    }

    pub async fn delete<E: TenantScoped>(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = E::delete_many()
            .filter(self.condition::<E>())
            .filter(E::id_column().eq(id))
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(Self::not_found::<E>(id));
        }
        Ok(())
    }

    /// Deletes every in-scope row matching `filter`, returning the count.
    pub async fn delete_where<E: TenantScoped>(&self, filter: Condition) -> Result<u64, ServiceError> {
        let result = E::delete_many()
            .filter(self.condition::<E>())
            .filter(filter)
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected)
    }
}
