//! Container Lookup Lambda - Handles the container data query endpoint.
//!
//! Looks up rows of the SharePoint `ContainerData` list by `containerNumber`
//! or `companyCode` and returns their field maps as a JSON array.

use lambda_http::http::header::AUTHORIZATION;
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::http::{json_response, text_response};
use shared::{Authenticator, Config, Filter, Principal, Record, SharePointClient};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// SharePoint list holding container rows.
const LIST_TITLE: &str = "ContainerData";

const MISSING_FILTER_MESSAGE: &str =
    "Please pass a containerNumber or companyCode on the query string";

/// Application state shared across requests.
struct AppState {
    config: Config,
    authenticator: Authenticator,
    sharepoint: SharePointClient,
}

impl AppState {
    fn new(config: Config) -> Result<Self, Error> {
        let authenticator = Authenticator::from_config(&config.auth)?;

        Ok(Self {
            config,
            authenticator,
            sharepoint: SharePointClient::new(reqwest::Client::new()),
        })
    }

    /// Authenticate to SharePoint and run the filter against the list.
    async fn lookup(&self, filter: &Filter) -> shared::Result<Vec<Record>> {
        let session = self.sharepoint.authenticate(&self.config).await?;
        session.list(LIST_TITLE).get_items(filter).await
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    info!(method = %event.method(), "Container lookup request received");

    let authorization = event
        .headers()
        .get(AUTHORIZATION)
        .map(|v| String::from_utf8_lossy(v.as_bytes()));

    match state.authenticator.authorize(authorization.as_deref()) {
        Ok(Principal::Subject(sub)) => debug!(subject = %sub, "Caller authenticated"),
        Ok(Principal::Anonymous) => {}
        Err(e) => {
            warn!(mode = state.authenticator.mode(), reason = %e, "Rejected unauthorized request");
            return text_response(401, "Unauthorized");
        }
    }

    let params = event.query_string_parameters();
    let Some(filter) = Filter::from_params(params.first("containerNumber"), params.first("companyCode"))
    else {
        return text_response(400, MISSING_FILTER_MESSAGE);
    };

    let rows = match state.lookup(&filter).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(field = filter.field_name(), status = e.status_code(), "Container lookup failed: {}", e);
            return Err(e.into());
        }
    };

    info!(field = filter.field_name(), rows = rows.len(), "Container lookup complete");

    json_response(200, &rows)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new(Config::from_env()?)?);
    info!(
        site = %state.config.site_url,
        auth_mode = state.authenticator.mode(),
        "Container lookup initialized"
    );

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
