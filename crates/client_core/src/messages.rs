//! HTTP access to channel history.

use reqwest::Client;
use shared::{
    domain::MessageId,
    protocol::{LoginRequest, LoginResponse, MessagePage},
};
use tracing::debug;

use crate::{
    cache::{InfiniteMessages, QueryCache},
    error::Result,
};

pub struct MessagesClient {
    http: Client,
    server_url: String,
    token: Option<String>,
}

impl MessagesClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub async fn login(&mut self, user_id: &str, name: &str) -> Result<LoginResponse> {
        let response: LoginResponse = self
            .http
            .post(format!("{}/login", self.server_url))
            .json(&LoginRequest {
                user_id: user_id.to_string(),
                name: name.to_string(),
                image_url: None,
                email: None,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.token = Some(response.token.clone());
        Ok(response)
    }

    /// GETs one page from `api_url`, e.g. `/api/messages?channelId=..&cursor=..`.
    pub async fn fetch_page(
        &self,
        api_url: &str,
        param_key: &str,
        param_value: &str,
        cursor: Option<&MessageId>,
    ) -> Result<MessagePage> {
        let mut query = vec![(param_key, param_value)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.as_str()));
        }

        let mut request = self
            .http
            .get(format!("{}{api_url}", self.server_url))
            .query(&query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let page: MessagePage = request.send().await?.error_for_status()?.json().await?;
        debug!(api_url, items = page.items.len(), "fetched message page");
        Ok(page)
    }

    /// Loads the newest page until one has come from the server, otherwise
    /// the page after the last cached cursor. Returns `false` once history is
    /// exhausted.
    pub async fn load_next_page(
        &self,
        cache: &QueryCache,
        query_key: &str,
        api_url: &str,
        param_key: &str,
        param_value: &str,
    ) -> Result<bool> {
        let cursor = match cache.get_query_data(query_key) {
            Some(cached) if cached.fetched => match cached.last_cursor() {
                Some(cursor) => Some(cursor.clone()),
                None => return Ok(false),
            },
            _ => None,
        };

        let page = self
            .fetch_page(api_url, param_key, param_value, cursor.as_ref())
            .await?;
        let has_more = page.next_cursor.is_some();
        cache.append_page(query_key, page);
        Ok(has_more)
    }

    /// Refetches the newest page and drops everything older.
    pub async fn refresh(
        &self,
        cache: &QueryCache,
        query_key: &str,
        api_url: &str,
        param_key: &str,
        param_value: &str,
    ) -> Result<()> {
        let page = self
            .fetch_page(api_url, param_key, param_value, None)
            .await?;
        cache.set_query_data(query_key, |old| {
            let seeded = old.filter(|old| !old.fetched);
            Some(InfiniteMessages::first_page(seeded, page))
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
