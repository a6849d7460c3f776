//! Accounts service.

use std::sync::Arc;

use lms_core::{validate_username, AccountUpdate, NewAccount};

use super::not_handled;
use crate::service::operation::{methods, Operation, OperationError, OperationResponse};
use crate::traits::AccountQuerier;

pub struct AccountService {
    store: Arc<dyn AccountQuerier>,
}

impl AccountService {
    pub const METHODS: &'static [&'static str] = &[
        methods::CREATE_ACCOUNT,
        methods::GET_ACCOUNT,
        methods::UPDATE_ACCOUNT,
    ];

    #[must_use]
    pub fn new(store: Arc<dyn AccountQuerier>) -> Self {
        Self { store }
    }

    async fn handle(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        match op {
            Operation::CreateAccount { payload, .. } => {
                validate_new(&payload)?;
                let username = payload.username.clone();
                self.store
                    .create_account(payload)
                    .await?
                    .map(OperationResponse::Account)
                    .ok_or_else(|| {
                        OperationError::validation(format!("username {username:?} is taken"))
                    })
            }
            Operation::GetAccount { username, .. } => {
                validate_username(&username).map_err(OperationError::validation)?;
                self.store
                    .get_account(&username)
                    .await?
                    .map(OperationResponse::Account)
                    .ok_or_else(|| account_not_found(username))
            }
            Operation::UpdateAccount {
                username, update, ..
            } => {
                validate_username(&username).map_err(OperationError::validation)?;
                validate_update(&update)?;
                self.store
                    .update_account(&username, update)
                    .await?
                    .map(OperationResponse::Account)
                    .ok_or_else(|| account_not_found(username))
            }
            other => Err(not_handled(&other)),
        }
    }
}

operation_service!(AccountService);

fn account_not_found(username: String) -> OperationError {
    OperationError::NotFound {
        entity: "account",
        id: username,
    }
}

fn check_email(email: &str) -> Result<(), OperationError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(OperationError::validation(format!(
            "email {email:?} is not an address"
        ))),
    }
}

fn validate_new(payload: &NewAccount) -> Result<(), OperationError> {
    validate_username(&payload.username).map_err(OperationError::validation)?;
    if payload.full_name.trim().is_empty() {
        return Err(OperationError::validation("full_name must not be empty"));
    }
    check_email(&payload.email)
}

fn validate_update(update: &AccountUpdate) -> Result<(), OperationError> {
    if update.full_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(OperationError::validation("full_name must not be empty"));
    }
    update.email.as_deref().map_or(Ok(()), check_email)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lms_core::ErrorKind;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::{service_names, OperationContext};
    use crate::storage::MemoryStore;

    fn ctx(method: &'static str) -> OperationContext {
        OperationContext::new(1, service_names::ACCOUNTS, method, Duration::from_secs(5))
    }

    fn create(username: &str) -> Operation {
        Operation::CreateAccount {
            ctx: ctx(methods::CREATE_ACCOUNT),
            payload: NewAccount {
                username: username.to_string(),
                full_name: "Dana Sarsen".to_string(),
                email: "dana@example.kz".to_string(),
            },
        }
    }

    fn service() -> Arc<AccountService> {
        Arc::new(AccountService::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn create_then_get() {
        let svc = service();
        svc.clone().oneshot(create("dana_s")).await.unwrap();
        let resp = svc
            .oneshot(Operation::GetAccount {
                ctx: ctx(methods::GET_ACCOUNT),
                username: "dana_s".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(resp, OperationResponse::Account(a) if a.email == "dana@example.kz"));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let svc = service();
        svc.clone().oneshot(create("dana_s")).await.unwrap();
        let err = svc.oneshot(create("dana_s")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn bad_username_is_rejected() {
        let err = service().oneshot(create("Dana!")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let svc = service();
        svc.clone().oneshot(create("dana_s")).await.unwrap();
        let resp = svc
            .clone()
            .oneshot(Operation::UpdateAccount {
                ctx: ctx(methods::UPDATE_ACCOUNT),
                username: "dana_s".to_string(),
                update: AccountUpdate {
                    full_name: None,
                    email: Some("d.sarsen@example.kz".to_string()),
                },
            })
            .await
            .unwrap();
        let OperationResponse::Account(account) = resp else {
            panic!("expected account");
        };
        assert_eq!(account.full_name, "Dana Sarsen");
        assert_eq!(account.email, "d.sarsen@example.kz");

        let err = svc
            .oneshot(Operation::UpdateAccount {
                ctx: ctx(methods::UPDATE_ACCOUNT),
                username: "nobody".to_string(),
                update: AccountUpdate::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::NotFound { entity: "account", .. }));
    }

    #[test]
    fn email_needs_both_halves() {
        assert!(check_email("a@b").is_ok());
        assert!(check_email("@b").is_err());
        assert!(check_email("plain").is_err());
    }
}
