use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use crate::fetcher::{FetchedPage, HtmlFetcher, PortalRequest};
use crate::models::{
    Credentials, Scorecard, ScorecardId, ScorecardSummary, SessionToken, SignInDetails,
};
use crate::parsers;
use std::sync::Arc;
use tracing::{Instrument, Span};

/// Client for the university's QIS portal.
///
/// Holds no session state: the caller owns the [`SessionToken`] and passes it
/// back on every call, so one client can serve many users concurrently.
pub struct PortalClient {
    fetcher: HtmlFetcher,
    config: Arc<PortalConfig>,
    span: Span,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self> {
        let config = Arc::new(config);
        let fetcher = HtmlFetcher::new(config.clone())?;

        Ok(Self {
            fetcher,
            config,
            span: Span::none(),
        })
    }

    /// Records every operation as a child of `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Signs in and returns the session token.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<SessionToken> {
        self.sign_in_details(credentials)
            .await
            .map(|details| details.token)
    }

    /// Signs in and also reports the display name the portal greets the user with.
    pub async fn sign_in_details(&self, credentials: Credentials) -> Result<SignInDetails> {
        let span = tracing::info_span!(parent: &self.span, "sign_in");
        async move {
            let page = self
                .fetcher
                .fetch(PortalRequest::Login(&credentials), None)
                .await?;
            drop(credentials);

            if parsers::session::is_login_rejected(&page.body) {
                tracing::info!("portal rejected the credentials");
                return Err(PortalError::InvalidCredentials);
            }
            let Some(session_value) = page.session_value else {
                tracing::info!("portal issued no session token");
                return Err(PortalError::InvalidCredentials);
            };
            let token = SessionToken::new(session_value);

            // The study menu carries the asi parameter needed for scorecard pages.
            let menu = self
                .fetcher
                .fetch(PortalRequest::StudyMenu, Some(&token))
                .await?;
            if parsers::session::is_login_page(&menu.body) {
                return Err(PortalError::UnexpectedPortalResponse(
                    "session was not accepted right after sign-in".to_string(),
                ));
            }

            let asi = parsers::session::parse_asi_parameter(&menu.body).ok_or_else(|| {
                tracing::warn!("study menu has no scorecard link");
                PortalError::UnexpectedPortalResponse(
                    "scorecard link with asi parameter not found".to_string(),
                )
            })?;
            let user_display_name = parsers::session::parse_user_display_name(&menu.body);

            tracing::info!("signed in");
            Ok(SignInDetails {
                token: token.with_asi(asi),
                user_display_name,
            })
        }
        .instrument(span)
        .await
    }

    /// Whether the portal still accepts `token`. Only fails when the portal
    /// cannot be reached.
    pub async fn check_session(&self, token: &SessionToken) -> Result<bool> {
        if token.is_empty() {
            return Ok(false);
        }

        let span = tracing::info_span!(parent: &self.span, "check_session");
        async move {
            let page = self
                .fetcher
                .fetch(PortalRequest::CheckSession, Some(token))
                .await?;
            let valid = !parsers::session::is_login_page(&page.body);
            tracing::debug!(valid, "checked session");
            Ok(valid)
        }
        .instrument(span)
        .await
    }

    /// Lists the scorecards available to the session, with their labels.
    pub async fn list_scorecards(&self, token: &SessionToken) -> Result<Vec<ScorecardSummary>> {
        let span = tracing::info_span!(parent: &self.span, "list_scorecards");
        async move {
            let page = self.fetch_authenticated(PortalRequest::ScorecardIndex, token).await?;
            let scorecards = parsers::scorecard_index::parse_scorecard_index(&page.body)
                .inspect_err(|e| tracing::warn!(error = %e, "cannot read scorecard index"))?;
            tracing::debug!(count = scorecards.len(), "listed scorecards");
            Ok(scorecards)
        }
        .instrument(span)
        .await
    }

    /// Lists the scorecard ids in the order the portal shows them.
    pub async fn list_scorecard_ids(&self, token: &SessionToken) -> Result<Vec<ScorecardId>> {
        let scorecards = self.list_scorecards(token).await?;
        Ok(scorecards.into_iter().map(|s| s.id).collect())
    }

    pub async fn get_scorecard(&self, token: &SessionToken, id: &ScorecardId) -> Result<Scorecard> {
        if id.as_str().trim().is_empty() {
            return Err(PortalError::NotFound("empty scorecard id".to_string()));
        }

        let span = tracing::info_span!(parent: &self.span, "get_scorecard");
        async move {
            let page = self.fetch_authenticated(PortalRequest::Scorecard(id), token).await?;
            parsers::scorecard::parse_scorecard(&page.body, self.config.credit_sum_policy)
                .inspect_err(|e| tracing::warn!(error = %e, "cannot read scorecard"))
        }
        .instrument(span)
        .await
    }

    async fn fetch_authenticated(
        &self,
        request: PortalRequest<'_>,
        token: &SessionToken,
    ) -> Result<FetchedPage> {
        if token.is_empty() {
            return Err(PortalError::InvalidSession);
        }
        let page = self.fetcher.fetch(request, Some(token)).await?;
        if parsers::session::is_login_page(&page.body) {
            tracing::info!(operation = request.name(), "session expired");
            return Err(PortalError::InvalidSession);
        }
        Ok(page)
    }
}
