use log::debug;
use serde::de::DeserializeOwned;
use url::Url;

use super::dispatcher::{DispatchSettings, RequestDispatcher};
use super::gate::CapacityGate;
use super::transport::{RetryPolicy, RetryingTransport, Timeouts};
use crate::auth::Credentials;
use crate::error::{Result, TcLensError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSettings {
    pub dispatch: DispatchSettings,
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
}

/// REST client for one TeamCity server.
///
/// Every call goes through the client's own dispatcher, so the configured
/// concurrency ceiling covers all operations issued through it.
pub struct TeamCityClient {
    base_url: Url,
    dispatcher: RequestDispatcher,
}

impl TeamCityClient {
    /// Creates a client and starts its dispatcher. Must be called from within
    /// a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, credentials: Credentials, settings: &ClientSettings) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| TcLensError::Config(format!("Invalid base URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let transport = RetryingTransport::new(settings.retry.clone(), &settings.timeouts)?;
        let dispatcher = RequestDispatcher::spawn(transport, credentials, &settings.dispatch);

        debug!("TeamCity client created for {base_url}");

        Ok(Self {
            base_url,
            dispatcher,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn gate(&self) -> &CapacityGate {
        self.dispatcher.gate()
    }

    /// Resolves a path under `app/rest/`.
    pub(super) fn rest_url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("app/rest/{path}"))?)
    }

    /// Resolves a server-relative link such as a `nextHref`.
    pub(super) fn link_url(&self, href: &str) -> Result<Url> {
        Ok(self.base_url.join(href)?)
    }

    /// Fetches and decodes a JSON document. `None` means the server answered
    /// 404.
    pub(super) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        match self.dispatcher.fetch(url).await? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_base_url_gets_trailing_slash() {
        let client = TeamCityClient::new(
            "https://ci.example.com/teamcity",
            Credentials::Anonymous,
            &ClientSettings::default(),
        )
        .unwrap();

        assert_eq!(
            client.rest_url("buildTypes").unwrap().as_str(),
            "https://ci.example.com/teamcity/app/rest/buildTypes"
        );
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_config_error() {
        let result = TeamCityClient::new(
            "not a url",
            Credentials::Anonymous,
            &ClientSettings::default(),
        );
        assert!(matches!(result, Err(TcLensError::Config(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/app/rest/buildTypes")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client =
            TeamCityClient::new(&server.url(), Credentials::Anonymous, &ClientSettings::default())
                .unwrap();
        let result = client.list_build_types(None).await;

        assert!(matches!(result, Err(TcLensError::Json(_))));
    }
}
