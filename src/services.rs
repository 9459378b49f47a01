//! Plain CRUD access to the backend's collections.
//!
//! These calls carry no authentication logic: credentials, refresh and session
//! expiry are handled by the gateway installed on the [`Client`]. An
//! [`Error::SessionExpired`](crate::Error::SessionExpired) is returned as-is.
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Client, Result};

/// A collection rooted at `prefix`, e.g. `/projects`.
#[derive(Debug)]
pub struct Resource<'a, T> {
    client: &'a Client,
    prefix: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for Resource<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Resource<'_, T> {}

impl<'a, T: DeserializeOwned> Resource<'a, T> {
    pub fn new(client: &'a Client, prefix: &'static str) -> Self {
        Self {
            client,
            prefix,
            _item: PhantomData,
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.prefix, urlencoding::encode(id))
    }

    pub async fn list(&self) -> Result<Vec<T>> {
        self.client.get(self.prefix).await?.error_for_status()?.json()
    }

    /// List items filtered by one query parameter, e.g. `tasks.list_where("project_id", "7")`.
    pub async fn list_where(&self, key: &str, value: &str) -> Result<Vec<T>> {
        self.client
            .get(self.prefix)
            .query(key, value)
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn get(&self, id: &str) -> Result<T> {
        self.client.get(&self.item_path(id)).await?.error_for_status()?.json()
    }

    pub async fn create(&self, body: &impl Serialize) -> Result<T> {
        self.client
            .post(self.prefix)
            .set_json(body)
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn update(&self, id: &str, body: &impl Serialize) -> Result<T> {
        self.client
            .put(&self.item_path(id))
            .set_json(body)
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&self.item_path(id)).await?.error_for_status()?;
        Ok(())
    }
}

pub fn projects<T: DeserializeOwned>(client: &Client) -> Resource<'_, T> {
    Resource::new(client, "/projects")
}

pub fn tasks<T: DeserializeOwned>(client: &Client) -> Resource<'_, T> {
    Resource::new(client, "/tasks")
}

pub fn users<T: DeserializeOwned>(client: &Client) -> Resource<'_, T> {
    Resource::new(client, "/users")
}

pub fn calendar_events<T: DeserializeOwned>(client: &Client) -> Resource<'_, T> {
    Resource::new(client, "/calendar/events")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::StatusCode;
    use serde::Deserialize;
    use serde_json::json;

    use crate::mock::MockTransport;
    use crate::{Request, Response};

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Task {
        id: u64,
        title: String,
    }

    fn api() -> Arc<MockTransport> {
        Arc::new(MockTransport::new(|request: Request| async move {
            match (request.method().as_str(), request.path()) {
                ("GET", "/tasks") => Response::json_with_status(StatusCode::OK, json!([{"id": 1, "title": "Draft"}])),
                ("GET", "/tasks/1") => Response::json_with_status(StatusCode::OK, json!({"id": 1, "title": "Draft"})),
                ("POST", "/tasks") | ("PUT", "/tasks/1") => {
                    let mut task: serde_json::Value = request.body().clone().json()?;
                    task["id"] = json!(1);
                    Response::json_with_status(StatusCode::OK, task)
                }
                ("DELETE", "/tasks/1") => Response::json_with_status(StatusCode::NO_CONTENT, json!(null)),
                _ => Response::json_with_status(StatusCode::NOT_FOUND, json!({"error": "not found"})),
            }
        }))
    }

    #[tokio::test]
    async fn test_crud() {
        let transport = api();
        let client = Client::with_transport(transport.clone()).base_url("http://api.test");
        let tasks = tasks::<Task>(&client);

        assert_eq!(tasks.list().await.unwrap(), vec![Task { id: 1, title: "Draft".into() }]);
        assert_eq!(tasks.get("1").await.unwrap().title, "Draft");
        assert_eq!(tasks.create(&json!({"title": "New"})).await.unwrap(), Task { id: 1, title: "New".into() });
        assert_eq!(tasks.update("1", &json!({"title": "Renamed"})).await.unwrap().title, "Renamed");
        tasks.delete("1").await.unwrap();

        let err = tasks.get("2").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_list_where() {
        let transport = api();
        let client = Client::with_transport(transport.clone()).base_url("http://api.test");
        tasks::<Task>(&client).list_where("project_id", "7").await.unwrap();
        assert_eq!(transport.requests()[0].uri().query(), Some("project_id=7"));
    }

    #[test]
    fn test_prefixes() {
        let client = Client::with_transport(api());
        assert_eq!(projects::<()>(&client).prefix(), "/projects");
        assert_eq!(users::<()>(&client).prefix(), "/users");
        assert_eq!(calendar_events::<()>(&client).prefix(), "/calendar/events");
    }
}
