use crate::config::{PortalConfig, SessionTransport};
use crate::error::{PortalError, Result};
use crate::models::{Credentials, ScorecardId, SessionToken};
use reqwest::StatusCode;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use url::Url;

/// The portal pages the client knows how to request.
#[derive(Debug, Clone, Copy)]
pub enum PortalRequest<'a> {
    /// Submit the login form.
    Login(&'a Credentials),
    /// The study menu, which links to the scorecards and carries the `asi` parameter.
    StudyMenu,
    /// A cheap page that shows the login form once the session is gone.
    CheckSession,
    /// The tree of available scorecards.
    ScorecardIndex,
    /// A single scorecard.
    Scorecard(&'a ScorecardId),
}

impl PortalRequest<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            PortalRequest::Login(_) => "login",
            PortalRequest::StudyMenu => "study_menu",
            PortalRequest::CheckSession => "check_session",
            PortalRequest::ScorecardIndex => "scorecard_index",
            PortalRequest::Scorecard(_) => "scorecard",
        }
    }

    fn query(&self, config: &PortalConfig) -> Vec<(&'static str, String)> {
        match self {
            PortalRequest::Login(_) => owned(&[
                ("state", "user"),
                ("type", "1"),
                ("category", "auth.login"),
                ("startpage", "portal.vm"),
                ("breadCrumbSource", "portal"),
            ]),
            PortalRequest::StudyMenu => owned(&[
                ("state", "change"),
                ("type", "1"),
                ("moduleParameter", "studyPOSMenu"),
                ("nextdir", "change"),
                ("next", "menu.vm"),
                ("subdir", "applications"),
                ("xml", "menu"),
                ("purge", "y"),
                ("navigationPosition", "functions,studyPOSMenu"),
                ("breadcrumb", "studyPOSMenu"),
                ("topitem", "functions"),
            ]),
            PortalRequest::CheckSession => {
                owned(&[("state", "user"), ("type", "0"), ("application", "lsf")])
            }
            PortalRequest::ScorecardIndex => owned(&[
                ("state", "notenspiegelStudent"),
                ("struct", "auswahlBaum"),
                ("navigation", "Y"),
                ("next", "tree.vm"),
                ("nextdir", "qispos/notenspiegel/student"),
                ("nodeID", config.index_node_id.as_str()),
                ("expand", "0"),
                ("lastState", "notenspiegelStudent"),
            ]),
            PortalRequest::Scorecard(id) => owned(&[
                ("state", "notenspiegelStudent"),
                ("menu_open", "n"),
                ("next", "list.vm"),
                ("nextdir", "qispos/notenspiegel/student"),
                ("createInfos", "Y"),
                ("struct", "auswahlBaum"),
                ("nodeID", id.as_str()),
                ("expand", "0"),
            ]),
        }
    }

    fn needs_asi(&self) -> bool {
        matches!(self, PortalRequest::ScorecardIndex | PortalRequest::Scorecard(_))
    }
}

fn owned(pairs: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
    pairs
        .iter()
        .map(|(key, value)| (*key, value.to_string()))
        .collect()
}

/// A successfully fetched portal page.
#[derive(Debug)]
pub struct FetchedPage {
    pub body: String,
    /// Session value issued by the portal; only set for login submissions.
    pub session_value: Option<String>,
}

/// Issues one HTTP request per call against the portal and returns the raw HTML.
pub struct HtmlFetcher {
    client: reqwest::Client,
    config: Arc<PortalConfig>,
}

impl HtmlFetcher {
    pub fn new(config: Arc<PortalConfig>) -> Result<Self> {
        let client = Self::client_builder(&config)?
            .build()
            .map_err(|e| PortalError::Config(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn client_builder(config: &PortalConfig) -> Result<reqwest::ClientBuilder> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| PortalError::Config("Invalid user agent".to_string()))?,
        );

        Ok(reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout))
    }

    /// Fetches the page for `request`. Every request except `Login` needs a token.
    pub async fn fetch(
        &self,
        request: PortalRequest<'_>,
        token: Option<&SessionToken>,
    ) -> Result<FetchedPage> {
        if let PortalRequest::Login(credentials) = request {
            return self.submit_login(credentials).await;
        }

        let token = token.ok_or(PortalError::InvalidSession)?;
        let url = self.url_for(&request, Some(token))?;
        tracing::debug!(operation = request.name(), path = url.path(), "fetching portal page");

        let mut builder = self.client.get(url);
        if let SessionTransport::Cookie { name } = &self.config.session_transport {
            builder = builder.header(COOKIE, format!("{}={}", name, token.value()));
        }

        let response = builder.send().await?;
        Self::read_page(request, response, None).await
    }

    async fn submit_login(&self, credentials: &Credentials) -> Result<FetchedPage> {
        let request = PortalRequest::Login(credentials);
        let url = self.url_for(&request, None)?;

        // Each sign-in gets its own jar so concurrent logins never share cookies.
        let jar = Arc::new(Jar::default());
        let client = Self::client_builder(&self.config)?
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| PortalError::Config(format!("Cannot build HTTP client: {}", e)))?;

        // The Struts login form names its fields "asdf" and "fdsa".
        let form = [
            ("asdf", credentials.username.as_str()),
            ("fdsa", credentials.password.as_str()),
            ("submit", "Login"),
        ];

        tracing::debug!(
            operation = request.name(),
            path = url.path(),
            session_key = self.config.session_transport.name(),
            "submitting login form"
        );
        let response = client.post(url.clone()).form(&form).send().await?;
        let session_value = self.session_value(&jar, &url, response.url());

        Self::read_page(request, response, session_value).await
    }

    fn session_value(&self, jar: &Jar, request_url: &Url, final_url: &Url) -> Option<String> {
        let value = match &self.config.session_transport {
            SessionTransport::Cookie { name } => [final_url, request_url].into_iter().find_map(|url| {
                let header = jar.cookies(url)?;
                header
                    .to_str()
                    .ok()?
                    .split(';')
                    .filter_map(|pair| pair.trim().split_once('='))
                    .find(|(key, _)| *key == name.as_str())
                    .map(|(_, value)| value.to_string())
            }),
            SessionTransport::QueryParameter { name } => final_url
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned()),
        };
        value.filter(|value| !value.is_empty())
    }

    fn url_for(&self, request: &PortalRequest<'_>, token: Option<&SessionToken>) -> Result<Url> {
        let mut url = Url::parse(&self.config.service_url())
            .map_err(|e| PortalError::Config(format!("Invalid portal URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in request.query(&self.config) {
                query.append_pair(key, &value);
            }
            if let Some(token) = token {
                if let (true, Some(asi)) = (request.needs_asi(), token.asi()) {
                    query.append_pair("asi", asi);
                }
                if let SessionTransport::QueryParameter { name } = &self.config.session_transport {
                    query.append_pair(name, token.value());
                }
            }
        }

        Ok(url)
    }

    async fn read_page(
        request: PortalRequest<'_>,
        response: reqwest::Response,
        session_value: Option<String>,
    ) -> Result<FetchedPage> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            if let PortalRequest::Scorecard(id) = request {
                return Err(PortalError::NotFound(id.to_string()));
            }
        }
        if !status.is_success() {
            tracing::warn!(operation = request.name(), %status, "portal answered with an error status");
            return Err(PortalError::PortalUnreachable(format!(
                "portal answered HTTP {}",
                status
            )));
        }

        let body = response.text().await?;
        tracing::debug!(operation = request.name(), bytes = body.len(), "received portal page");

        Ok(FetchedPage {
            body,
            session_value,
        })
    }
}
