use serde::Serialize;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Request-scoped identity handed over by the authentication layer.
///
/// The value is immutable and is passed by reference through every call; it is
/// never stored in shared state. A context can only be built from non-nil
/// identifiers, so holding one proves the caller was scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TenantContext {
    tenant_id: Uuid,
    company_id: Uuid,
    user_id: Uuid,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, company_id: Uuid, user_id: Uuid) -> Result<Self, ServiceError> {
        for (name, value) in [
            ("tenant_id", tenant_id),
            ("company_id", company_id),
            ("user_id", user_id),
        ] {
            if value.is_nil() {
                return Err(ServiceError::TenantContextMissing(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }

        Ok(Self {
            tenant_id,
            company_id,
            user_id,
        })
    }

    /// Builds a context from optional claims, failing closed when any is absent.
    pub fn from_parts(
        tenant_id: Option<Uuid>,
        company_id: Option<Uuid>,
        user_id: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        match (tenant_id, company_id, user_id) {
            (Some(tenant), Some(company), Some(user)) => Self::new(tenant, company, user),
            _ => Err(ServiceError::TenantContextMissing(
                "tenant, company and user are required".to_string(),
            )),
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn company_id(&self) -> Uuid {
        self.company_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn rejects_nil_identifiers() {
        let err = TenantContext::new(Uuid::nil(), Uuid::new_v4(), Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantContextMissing);

        let err = TenantContext::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::nil()).unwrap_err();
        assert!(err.to_string().contains("user_id"));
    }

    #[test]
    fn from_parts_fails_closed() {
        let err = TenantContext::from_parts(Some(Uuid::new_v4()), None, Some(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantContextMissing);

        let tenant = Uuid::new_v4();
        let ctx =
            TenantContext::from_parts(Some(tenant), Some(Uuid::new_v4()), Some(Uuid::new_v4()))
                .unwrap();
        assert_eq!(ctx.tenant_id(), tenant);
    }
}
