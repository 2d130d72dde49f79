//! HTTP client for the account-management API.

use crate::models::{Account, AccountFilter, AccountUpdate, Group, Status};
use crate::Result;
use hpcadm_core::client::{ServiceClient, ServiceClientBuilder, ACTMGR_DEFAULT_TIMEOUT};
use hpcadm_core::settings::ActmgrSettings;
use hpcadm_core::Error;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct StatusEnvelope {
    status: Status,
}

#[derive(Deserialize)]
struct AccountsPage {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct AccountEnvelope {
    account: Account,
}

/// Client for the account-management REST API.
pub struct ActmgrClient {
    client: ServiceClient,
}

impl ActmgrClient {
    /// Builds a client from the settings file section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the base URL is invalid.
    pub fn from_settings(settings: &ActmgrSettings) -> Result<Self> {
        let client = ServiceClientBuilder::new(
            "actmgr",
            settings.base_url(),
            Duration::from_secs(ACTMGR_DEFAULT_TIMEOUT),
        )?
        .with_token_auth(settings.auth_token.clone())
        .build()?;
        Ok(Self { client })
    }

    /// Wraps an already-built service client. Used by tests.
    #[must_use]
    pub fn with_client(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Fetches a status record by name, e.g. `CLOSED`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the status does not exist; other
    /// non-2xx responses map to [`Error::ExternalServiceError`].
    pub async fn get_status(&self, name: &str) -> Result<Status> {
        let path = format!("api/statuses/{name}");
        let response = self
            .client
            .execute_with_retry(Method::GET, &path, &[], |r| r, map_actmgr_status)
            .await?;
        let envelope: StatusEnvelope = response.json().await?;
        Ok(envelope.status)
    }

    /// Lists accounts matching the filter, following pagination until the
    /// server returns an empty page.
    ///
    /// # Errors
    ///
    /// Any non-2xx response on any page aborts the listing with an error.
    pub async fn list_accounts(&self, filter: &AccountFilter) -> Result<Vec<Account>> {
        let mut all = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut query: Vec<(&'static str, String)> = vec![("page", page.to_string())];
            if let Some(username) = &filter.username {
                query.push(("username", username.clone()));
            }
            if let Some(status_id) = filter.status_id {
                query.push(("status_id", status_id.to_string()));
            }

            let response = self
                .client
                .execute_with_retry(Method::GET, "api/accounts", &query, |r| r, map_actmgr_status)
                .await?;
            let body: AccountsPage = response.json().await?;

            if body.accounts.is_empty() {
                break;
            }
            debug!(page, count = body.accounts.len(), "fetched account page");
            all.extend(body.accounts);
            page += 1;
        }

        Ok(all)
    }

    /// Fetches the single account for a login name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for zero matches and
    /// [`Error::IntegrityError`] for more than one.
    pub async fn get_account(&self, username: &str) -> Result<Account> {
        let mut accounts = self
            .list_accounts(&AccountFilter::by_username(username))
            .await?;
        match accounts.len() {
            0 => Err(Error::NotFound(format!("no account named {username}"))),
            1 => Ok(accounts.remove(0)),
            n => Err(Error::IntegrityError(format!(
                "{n} accounts named {username}, expected exactly one"
            ))),
        }
    }

    /// Applies an update to the account and returns the updated record.
    pub async fn update_account(&self, account_id: u64, update: &AccountUpdate) -> Result<Account> {
        let path = format!("api/accounts/{account_id}");
        let body = serde_json::json!({ "account": update });
        let response = self
            .client
            .execute_with_retry(
                Method::PUT,
                &path,
                &[],
                move |r| r.json(&body),
                map_actmgr_status,
            )
            .await?;
        let envelope: AccountEnvelope = response.json().await?;
        Ok(envelope.account)
    }

    /// Lists groups matching the name filter. The groups endpoint returns
    /// bare arrays per page rather than an envelope.
    pub async fn list_groups(&self, name: Option<&str>) -> Result<Vec<Group>> {
        let mut all = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut query: Vec<(&'static str, String)> = vec![("page", page.to_string())];
            if let Some(name) = name {
                query.push(("name", name.to_string()));
            }

            let response = self
                .client
                .execute_with_retry(Method::GET, "api/groups", &query, |r| r, map_actmgr_status)
                .await?;
            let groups: Vec<Group> = response.json().await?;

            if groups.is_empty() {
                break;
            }
            all.extend(groups);
            page += 1;
        }

        Ok(all)
    }

    /// Fetches the single group with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for zero matches and
    /// [`Error::IntegrityError`] for more than one.
    pub async fn get_group(&self, name: &str) -> Result<Group> {
        let mut groups = self.list_groups(Some(name)).await?;
        match groups.len() {
            0 => Err(Error::NotFound(format!("no group named {name}"))),
            1 => Ok(groups.remove(0)),
            n => Err(Error::IntegrityError(format!(
                "{n} groups named {name}, expected exactly one"
            ))),
        }
    }
}

fn map_actmgr_status(status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::ExternalServiceError {
            service: "actmgr".to_string(),
            message: format!("authentication rejected ({status})"),
        },
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => Error::BadRequest(body),
        _ => Error::ExternalServiceError {
            service: "actmgr".to_string(),
            message: format!("{status}: {body}"),
        },
    }
}
