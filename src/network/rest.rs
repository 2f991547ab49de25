use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::model::{
    post_request_body, ErrorResponse, PostWire, PostsResponse, SitesResponse, ThemeWire,
    ThemesResponse,
};
use super::{PostClient, PostsPage, SiteClient, ThemeClient};
use crate::config::Api;
use crate::error::{ClientBuildError, ClientError};
use crate::model::{LocalId, PostModel, RemoteId, SiteModel, ThemeModel};

const WPCOM_API_BASE: &str = "https://public-api.wordpress.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const POSTS_PAGE_SIZE: u32 = 20;

/// WordPress.com REST client serving sites, themes and posts.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(token: String, user_agent: &str) -> Result<Self, ClientBuildError> {
        Self::with_base_url(token, user_agent, parse_base_url(WPCOM_API_BASE)?)
    }

    pub fn with_base_url(
        token: String,
        user_agent: &str,
        base_url: Url,
    ) -> Result<Self, ClientBuildError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn from_config(api: &Api) -> Result<Self, ClientBuildError> {
        let base_url = parse_base_url(&api.base_url)?;
        Self::with_base_url(api.token.clone(), &api.user_agent, base_url)
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ClientError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::Network(format!("invalid endpoint {path}: {e}")))?;
        let mut builder = self.http.request(method, endpoint).query(query);
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, ClientError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, path = url.path(), "REST request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            let err = classify_error(status, &body);
            warn!(%method, path = url.path(), %status, "REST request failed: {err}");
            return Err(err);
        }
        parse_body(&body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError> {
        let request = self.build_request(Method::GET, path, query, None)?;
        self.execute(request).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<&Value>) -> Result<T, ClientError> {
        let request = self.build_request(Method::POST, path, &[], body)?;
        self.execute(request).await
    }
}

fn parse_base_url(url: &str) -> Result<Url, ClientBuildError> {
    Url::parse(url).map_err(|e| ClientBuildError::InvalidBaseUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Maps a non-success response to an error kind.
pub fn classify_error(status: StatusCode, body: &str) -> ClientError {
    let parsed: Option<ErrorResponse> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(e) => (e.error, e.message),
        None => (String::new(), body.trim().to_string()),
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let detail = if message.is_empty() { code } else { message };
            ClientError::Authentication(detail)
        }
        _ => ClientError::RemoteRejection {
            code: if code.is_empty() {
                status.as_u16().to_string()
            } else {
                code
            },
            message,
        },
    }
}

pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    Ok(serde_json::from_str(body)?)
}

fn remote_site_id(site: &SiteModel) -> Result<RemoteId, ClientError> {
    match site.site_id {
        Some(id) if site.uses_rest_api() => Ok(id),
        _ => Err(ClientError::Capability(format!(
            "site {} is not reachable over the REST API",
            site.url
        ))),
    }
}

fn local_site_id(site: &SiteModel) -> Result<LocalId, ClientError> {
    site.id
        .ok_or_else(|| ClientError::Capability(format!("site {} is not stored locally", site.url)))
}

fn remote_post_id(post: &PostModel) -> Result<RemoteId, ClientError> {
    post.remote_post_id
        .ok_or_else(|| ClientError::Capability("post has not been uploaded".into()))
}

#[async_trait]
impl SiteClient for RestClient {
    async fn fetch_sites(&self) -> Result<Vec<SiteModel>, ClientError> {
        let resp: SitesResponse = self
            .get("rest/v1.1/me/sites", &[("fields", "ID,name,URL,jetpack,visible,options".to_string())])
            .await?;
        Ok(resp.sites.into_iter().map(|s| s.into_model()).collect())
    }
}

#[async_trait]
impl ThemeClient for RestClient {
    async fn fetch_wpcom_themes(&self) -> Result<Vec<ThemeModel>, ClientError> {
        let resp: ThemesResponse = self
            .get("rest/v1.2/themes", &[("number", "500".to_string())])
            .await?;
        Ok(resp.themes.into_iter().map(ThemeWire::into_model).collect())
    }

    async fn fetch_installed_themes(&self, site: &SiteModel) -> Result<Vec<ThemeModel>, ClientError> {
        let site_id = remote_site_id(site)?;
        let resp: ThemesResponse = self
            .get(&format!("rest/v1.1/sites/{site_id}/themes"), &[])
            .await?;
        Ok(resp.themes.into_iter().map(ThemeWire::into_model).collect())
    }

    async fn fetch_current_theme(&self, site: &SiteModel) -> Result<ThemeModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let theme: ThemeWire = self
            .get(&format!("rest/v1.1/sites/{site_id}/themes/mine"), &[])
            .await?;
        Ok(theme.into_model())
    }

    async fn activate_theme(&self, site: &SiteModel, theme: &ThemeModel) -> Result<ThemeModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let body = json!({ "theme": theme.theme_id });
        let activated: ThemeWire = self
            .post(&format!("rest/v1.1/sites/{site_id}/themes/mine"), Some(&body))
            .await?;
        Ok(ThemeModel {
            active: true,
            ..activated.into_model()
        })
    }

    async fn install_theme(&self, site: &SiteModel, theme: &ThemeModel) -> Result<ThemeModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let installed: ThemeWire = self
            .post(
                &format!("rest/v1.1/sites/{site_id}/themes/{}/install", theme.theme_id),
                None,
            )
            .await?;
        Ok(installed.into_model())
    }

    async fn delete_theme(&self, site: &SiteModel, theme: &ThemeModel) -> Result<ThemeModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let deleted: ThemeWire = self
            .post(
                &format!("rest/v1.1/sites/{site_id}/themes/{}/delete", theme.theme_id),
                None,
            )
            .await?;
        Ok(deleted.into_model())
    }
}

#[async_trait]
impl PostClient for RestClient {
    async fn fetch_posts(&self, site: &SiteModel, pages: bool, offset: u32) -> Result<PostsPage, ClientError> {
        let site_id = remote_site_id(site)?;
        let local = local_site_id(site)?;
        let query = [
            ("context", "edit".to_string()),
            ("number", POSTS_PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
            ("type", if pages { "page" } else { "post" }.to_string()),
            ("status", "any".to_string()),
        ];
        let resp: PostsResponse = self
            .get(&format!("rest/v1.1/sites/{site_id}/posts"), &query)
            .await?;
        let can_load_more = resp.posts.len() as u32 == POSTS_PAGE_SIZE;
        let posts = resp
            .posts
            .into_iter()
            .map(|p| PostModel {
                is_page: pages,
                ..p.into_model(local)
            })
            .collect();
        Ok(PostsPage { posts, can_load_more })
    }

    async fn fetch_post(&self, site: &SiteModel, remote_id: RemoteId) -> Result<PostModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let local = local_site_id(site)?;
        let post: PostWire = self
            .get(
                &format!("rest/v1.1/sites/{site_id}/posts/{remote_id}"),
                &[("context", "edit".to_string())],
            )
            .await?;
        Ok(post.into_model(local))
    }

    async fn push_post(&self, site: &SiteModel, post: &PostModel) -> Result<PostModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let local = local_site_id(site)?;
        let path = match post.remote_post_id {
            Some(remote) => format!("rest/v1.1/sites/{site_id}/posts/{remote}"),
            None => format!("rest/v1.1/sites/{site_id}/posts/new"),
        };
        let uploaded: PostWire = self.post(&path, Some(&post_request_body(post))).await?;
        Ok(uploaded.into_model(local))
    }

    async fn delete_post(&self, site: &SiteModel, post: &PostModel) -> Result<PostModel, ClientError> {
        let site_id = remote_site_id(site)?;
        let local = local_site_id(site)?;
        let remote = remote_post_id(post)?;
        let deleted: PostWire = self
            .post(&format!("rest/v1.1/sites/{site_id}/posts/{remote}/delete"), None)
            .await?;
        Ok(deleted.into_model(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::with_base_url(
            "secret".into(),
            "fluxsync-test",
            Url::parse("https://example.test/").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn builds_authorized_request() {
        let request = client()
            .build_request(
                Method::GET,
                "rest/v1.1/sites/982/posts",
                &[("number", "20".to_string()), ("type", "page".to_string())],
                None,
            )
            .unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://example.test/rest/v1.1/sites/982/posts?number=20&type=page"
        );
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn anonymous_requests_have_no_authorization() {
        let client = RestClient::with_base_url(
            String::new(),
            "fluxsync-test",
            Url::parse("https://example.test/").unwrap(),
        )
        .unwrap();
        let body = json!({ "theme": "edin" });
        let request = client
            .build_request(Method::POST, "rest/v1.1/sites/1/themes/mine", &[], Some(&body))
            .unwrap();
        assert!(request.headers().get("Authorization").is_none());
        assert_eq!(
            request.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn bad_base_url_is_a_configuration_error() {
        let api = Api {
            base_url: "public-api.wordpress.com".into(),
            token: String::new(),
            user_agent: "fluxsync-test".into(),
        };
        match RestClient::from_config(&api).unwrap_err() {
            ClientBuildError::InvalidBaseUrl { url, .. } => {
                assert_eq!(url, "public-api.wordpress.com");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(RestClient::new(String::new(), "fluxsync-test").is_ok());
    }

    #[test]
    fn debug_does_not_leak_token() {
        let printed = format!("{:?}", client());
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn classifies_errors() {
        let err = classify_error(
            StatusCode::FORBIDDEN,
            r#"{"error":"unauthorized","message":"User cannot access this private blog."}"#,
        );
        assert!(matches!(err, ClientError::Authentication(m) if m.contains("private blog")));

        let err = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"theme_not_found","message":"Theme not found"}"#,
        );
        match err {
            ClientError::RemoteRejection { code, message } => {
                assert_eq!(code, "theme_not_found");
                assert_eq!(message, "Theme not found");
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = classify_error(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(matches!(err, ClientError::RemoteRejection { code, .. } if code == "502"));
    }

    #[test]
    fn malformed_bodies_are_reported() {
        let err = parse_body::<ThemesResponse>("{not json").unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }

    #[test]
    fn self_hosted_sites_are_rejected_before_any_request() {
        let site = SiteModel {
            self_hosted_site_id: Some(6),
            xmlrpc_url: Some("http://some.url/xmlrpc.php".into()),
            ..Default::default()
        };
        assert!(matches!(remote_site_id(&site), Err(ClientError::Capability(_))));
    }
}
