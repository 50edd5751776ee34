//! SharePoint REST client using the app-only client credential flow.
//!
//! Authentication takes two round trips: an anonymous probe of the site's
//! `client.svc` endpoint to discover the tenant realm from the
//! `WWW-Authenticate` challenge, then a token request to Azure ACS. The
//! resulting access token is used for list queries until the session drops.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::caml::Filter;
use crate::{Config, Error, Result};

/// Principal id of SharePoint Online, used when the challenge omits it.
const SHAREPOINT_PRINCIPAL: &str = "00000003-0000-0ff1-ce00-000000000000";

/// OData flavour that returns plain field maps.
const ODATA_NOMETADATA: &str = "application/json;odata=nometadata";

/// A list row: field name to value, exactly as SharePoint returned it.
pub type Record = Map<String, Value>;

/// Parameters of the `Bearer` challenge returned by `client.svc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub client_id: String,
}

impl BearerChallenge {
    /// Parse a header like `Bearer realm="...",client_id="...",trusted_issuers="..."`.
    pub fn parse(header: &str) -> Option<Self> {
        let params = header.trim().strip_prefix("Bearer")?;

        let mut realm = None;
        let mut client_id = None;
        for part in params.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "realm" => realm = Some(value),
                "client_id" => client_id = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm.filter(|r| !r.is_empty())?,
            client_id: client_id
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| SHAREPOINT_PRINCIPAL.to_string()),
        })
    }
}

/// ACS token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// ACS sends this as a string
    #[serde(default)]
    expires_in: Option<Value>,
}

/// `GetItems` response in nometadata form.
#[derive(Debug, Deserialize)]
struct ItemsResponse {
    value: Vec<Record>,
}

/// HTTP client for one SharePoint site.
#[derive(Clone)]
pub struct SharePointClient {
    http_client: reqwest::Client,
}

impl Default for SharePointClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl SharePointClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Run the client credential flow against the configured site.
    pub async fn authenticate(&self, config: &Config) -> Result<Session> {
        let challenge = self.discover_realm(&config.site_url).await?;
        let host = site_host(&config.site_url)?;

        let token_url = format!(
            "{}/{}/tokens/OAuth/2",
            config.acs_endpoint,
            urlencoding::encode(&challenge.realm)
        );
        let client_id = format!("{}@{}", config.client_id, challenge.realm);
        let resource = format!("{}/{}@{}", challenge.client_id, host, challenge.realm);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("resource", resource.as_str()),
        ];

        let response = self.http_client.post(&token_url).form(&params).send().await?;
        let token: TokenResponse = parse_json(response).await?;

        let expires_at = token
            .expires_in
            .as_ref()
            .and_then(|v| match v {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            })
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        info!(realm = %challenge.realm, expires_at = ?expires_at, "Acquired SharePoint access token");

        Ok(Session {
            http_client: self.http_client.clone(),
            site_url: config.site_url.clone(),
            access_token: token.access_token,
            expires_at,
        })
    }

    /// Probe `client.svc` anonymously and read the realm from the challenge.
    async fn discover_realm(&self, site_url: &str) -> Result<BearerChallenge> {
        let url = format!("{}/_vti_bin/client.svc", site_url);
        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, "Bearer")
            .send()
            .await?;

        let status = response.status();
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse);

        match challenge {
            Some(challenge) => {
                debug!(realm = %challenge.realm, "Discovered SharePoint realm");
                Ok(challenge)
            }
            None => Err(Error::SharePoint {
                status: status.as_u16(),
                message: "Realm discovery returned no Bearer challenge".to_string(),
            }),
        }
    }
}

/// An authenticated connection to a SharePoint site.
pub struct Session {
    http_client: reqwest::Client,
    site_url: String,
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// When the access token expires, if ACS reported it.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Handle to a list addressed by its title.
    pub fn list<'a>(&'a self, title: &'a str) -> ListHandle<'a> {
        ListHandle {
            session: self,
            title,
        }
    }
}

/// A list within a [`Session`].
pub struct ListHandle<'a> {
    session: &'a Session,
    title: &'a str,
}

impl ListHandle<'_> {
    /// Run a CAML filter and return every matching row.
    pub async fn get_items(&self, filter: &Filter) -> Result<Vec<Record>> {
        let url = format!(
            "{}/_api/web/lists/GetByTitle('{}')/GetItems",
            self.session.site_url,
            urlencoding::encode(&self.title.replace('\'', "''"))
        );
        let body = serde_json::json!({
            "query": { "ViewXml": filter.to_view_xml() }
        });

        debug!(list = self.title, field = filter.field_name(), "Querying SharePoint list");

        let response = self
            .session
            .http_client
            .post(&url)
            .bearer_auth(&self.session.access_token)
            .header(ACCEPT, ODATA_NOMETADATA)
            .json(&body)
            .send()
            .await?;

        let items: ItemsResponse = parse_json(response).await?;
        Ok(items.value)
    }
}

/// Decode a JSON body, turning non-success statuses into `Error::SharePoint`.
async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(Error::SharePoint {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                message
            },
        });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Host name of the site URL, as ACS expects in the resource id.
fn site_host(site_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(site_url)
        .map_err(|e| Error::Config(format!("Invalid SP_SITE_URL: {}", e)))?;

    url.host_str()
        .map(String::from)
        .ok_or_else(|| Error::Config("SP_SITE_URL has no host".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REALM: &str = "3f2a5c1e-0000-4a5b-9c8d-112233445566";

    fn config(server: &MockServer) -> Config {
        Config {
            site_url: server.uri(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            acs_endpoint: server.uri(),
            auth: AuthConfig::HeaderPresence,
        }
    }

    async fn mount_auth(server: &MockServer) {
        mount_auth_with_expiry(server, serde_json::json!("3599")).await;
    }

    async fn mount_auth_with_expiry(server: &MockServer, expires_in: Value) {
        let resource = format!(
            "resource={}%2F{}%40{}",
            SHAREPOINT_PRINCIPAL,
            server.address().ip(),
            REALM
        );

        Mock::given(method("GET"))
            .and(path("/_vti_bin/client.svc"))
            .and(header("authorization", "Bearer"))
            .respond_with(ResponseTemplate::new(401).insert_header(
                "WWW-Authenticate",
                format!(
                    r#"Bearer realm="{}",client_id="{}",trusted_issuers="00000001-0000-0000-c000-000000000000@*""#,
                    REALM, SHAREPOINT_PRINCIPAL
                )
                .as_str(),
            ))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/{}/tokens/OAuth/2", REALM)))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-id%40"))
            .and(body_string_contains("client_secret=client-secret"))
            .and(body_string_contains(resource))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "access_token": "sp-access-token",
                "expires_in": expires_in,
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_challenge() {
        let challenge = BearerChallenge::parse(
            r#"Bearer realm="abc",client_id="00000003-0000-0ff1-ce00-000000000000",trusted_issuers="x@*""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "abc");
        assert_eq!(challenge.client_id, SHAREPOINT_PRINCIPAL);

        let without_client = BearerChallenge::parse(r#"Bearer realm="abc""#).unwrap();
        assert_eq!(without_client.client_id, SHAREPOINT_PRINCIPAL);

        assert_eq!(BearerChallenge::parse(r#"NTLM"#), None);
        assert_eq!(BearerChallenge::parse(r#"Bearer client_id="x""#), None);
    }

    #[test]
    fn test_site_host() {
        assert_eq!(
            site_host("https://contoso.sharepoint.com/sites/logistics").unwrap(),
            "contoso.sharepoint.com"
        );
        assert_eq!(site_host("http://127.0.0.1:8080/sites/x").unwrap(), "127.0.0.1");
        assert!(site_host("not a url").is_err());
    }

    #[tokio::test]
    async fn test_authenticate_and_query() {
        let server = MockServer::start().await;
        mount_auth(&server).await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/_api/web/lists/GetByTitle\(.*ContainerData.*\)/GetItems$"))
            .and(header("authorization", "Bearer sp-access-token"))
            .and(header("accept", ODATA_NOMETADATA))
            .and(body_partial_json(serde_json::json!({
                "query": {
                    "ViewXml": "<View><Query><Where><Eq><FieldRef Name='ContainerNumber'/><Value Type='Text'>MSKU1234567</Value></Eq></Where></Query></View>"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    { "Id": 7, "Title": "MSKU1234567", "ContainerNumber": "MSKU1234567", "CompanyCode": "CO9", "Arrived": null }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SharePointClient::default();
        let session = client.authenticate(&config(&server)).await.unwrap();
        assert!(session.expires_at().is_some());

        let rows = session
            .list("ContainerData")
            .get_items(&Filter::ByContainerNumber("MSKU1234567".to_string()))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["CompanyCode"], "CO9");
        assert_eq!(rows[0]["Arrived"], Value::Null);
        assert_eq!(rows[0].len(), 5);
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_is_ignored() {
        let server = MockServer::start().await;

        for expires_in in [
            serde_json::json!("9223372036854775807"),
            serde_json::json!(i64::MAX),
            serde_json::json!("soon"),
        ] {
            server.reset().await;
            mount_auth_with_expiry(&server, expires_in).await;

            let session = SharePointClient::default()
                .authenticate(&config(&server))
                .await
                .unwrap();
            assert_eq!(session.expires_at(), None);
        }
    }

    #[tokio::test]
    async fn test_rejected_secret_is_sharepoint_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_vti_bin/client.svc"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", format!(r#"Bearer realm="{}""#, REALM).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/tokens/OAuth/2", REALM)))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#,
            ))
            .mount(&server)
            .await;

        let err = SharePointClient::default()
            .authenticate(&config(&server))
            .await
            .err()
            .unwrap();
        match err {
            Error::SharePoint { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid_client"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_challenge_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_vti_bin/client.svc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = SharePointClient::default()
            .authenticate(&config(&server))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::SharePoint { status: 404, .. }));
    }
}
