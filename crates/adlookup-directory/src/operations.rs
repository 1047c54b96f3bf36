//! Operation surface exposed to the request framework.

use crate::{client::DirectoryClient, shaper::LookupResult};
use adlookup_core::error::ErrorResponse;
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Message returned when required input is missing.
pub const GUIDANCE_MESSAGE: &str = "Please enter the required information!";

/// Response of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResponse {
    /// Lookup succeeded.
    Found(LookupResult),
    /// Required input was missing; nothing was looked up.
    Guidance {
        /// Guidance text.
        message: String,
    },
    /// Lookup failed.
    Failed(ErrorResponse),
}

impl OperationResponse {
    fn guidance() -> Self {
        Self::Guidance {
            message: GUIDANCE_MESSAGE.to_string(),
        }
    }

    /// HTTP-style status of the response.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Found(_) | Self::Guidance { .. } => 200,
            Self::Failed(response) => response.code,
        }
    }
}

/// The three lookup operations.
pub struct DirectoryOperations {
    client: DirectoryClient,
}

impl DirectoryOperations {
    /// Wraps a client.
    #[must_use]
    pub fn new(client: DirectoryClient) -> Self {
        Self { client }
    }

    /// Members of a role group, or a presence check when `username` is given.
    pub async fn get_users_in_role(
        &self,
        role_group: Option<&str>,
        username: Option<&str>,
    ) -> OperationResponse {
        let Some(role_group) = non_empty(role_group) else {
            return OperationResponse::guidance();
        };
        let username = non_empty(username);

        let request_id = Uuid::new_v4();
        let span = info_span!("getUsersInRole", %request_id);
        async {
            info!(role_group, presence_check = username.is_some(), "looking up role members");
            let result = self.client.users_in_role(role_group, username).await;
            respond(result, "Failed to fetch users", request_id)
        }
        .instrument(span)
        .await
    }

    /// Details for a list of accounts.
    pub async fn get_user_info(&self, usernames: Option<&[String]>) -> OperationResponse {
        let Some(usernames) = usernames.filter(|names| !names.is_empty()) else {
            return OperationResponse::guidance();
        };

        let request_id = Uuid::new_v4();
        let span = info_span!("getUserInfo", %request_id);
        async {
            info!(count = usernames.len(), "looking up user info");
            let result = self.client.user_info(usernames).await;
            respond(result, "Failed to fetch user info", request_id)
        }
        .instrument(span)
        .await
    }

    /// Group names of one account.
    pub async fn get_user_groups(&self, username: Option<&str>) -> OperationResponse {
        let Some(username) = non_empty(username) else {
            return OperationResponse::guidance();
        };

        let request_id = Uuid::new_v4();
        let span = info_span!("getUserGroups", %request_id);
        async {
            info!(username, "looking up user groups");
            let result = self.client.user_groups(username).await;
            respond(result, "Failed to fetch user groups", request_id)
        }
        .instrument(span)
        .await
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn respond(
    result: crate::Result<LookupResult>,
    context: &str,
    request_id: Uuid,
) -> OperationResponse {
    match result {
        Ok(found) => OperationResponse::Found(found),
        Err(err) => {
            error!(
                error = %err,
                kind = err.error_code(),
                transport = err.is_transport(),
                "{context}"
            );
            OperationResponse::Failed(
                err.into_error_response_with_id(Some(request_id.to_string()))
                    .with_context(context),
            )
        }
    }
}
