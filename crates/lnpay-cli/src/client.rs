//! Thin JSON client for the node's HTTP API.

use lnpay_core::ErrorResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;

const USER_ID_HEADER: &str = "X-User-Id";

pub struct ApiClient {
    endpoint: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, user: Option<i64>) -> anyhow::Result<T> {
        let mut req = self.http.get(self.url(path));
        if let Some(user) = user {
            req = req.header(USER_ID_HEADER, user.to_string());
        }
        self.send(req).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        user: Option<i64>,
        body: Option<&B>,
    ) -> anyhow::Result<T> {
        let mut req = self.http.post(self.url(path));
        if let Some(user) = user {
            req = req.header(USER_ID_HEADER, user.to_string());
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        self.send(req).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> anyhow::Result<T> {
        let resp = req.send().await.map_err(|e| {
            anyhow::anyhow!(
                "could not reach node at {} ({}). Is lnpay-node running?",
                self.endpoint,
                e
            )
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        match resp.json::<ErrorResponse>().await {
            Ok(err) => anyhow::bail!("{} (code {}, HTTP {})", err.message, err.code, status),
            Err(_) => anyhow::bail!("request failed (HTTP {})", status),
        }
    }
}
