//! WordPress.com REST wire formats and their mapping to domain records.
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{LocalId, PostModel, RemoteId, SiteModel, ThemeModel};

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SitesResponse {
    #[serde(default)]
    pub sites: Vec<SiteWire>,
}

#[derive(Debug, Deserialize)]
pub struct SiteWire {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(default)]
    pub jetpack: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub options: Option<SiteOptionsWire>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SiteOptionsWire {
    #[serde(default)]
    pub xmlrpc_url: Option<String>,
}

fn default_visible() -> bool {
    true
}

impl SiteWire {
    pub fn into_model(self) -> SiteModel {
        SiteModel {
            id: None,
            site_id: Some(RemoteId(self.id)),
            self_hosted_site_id: None,
            name: self.name,
            url: self.url,
            xmlrpc_url: self.options.and_then(|o| o.xmlrpc_url),
            is_wpcom: !self.jetpack,
            is_jetpack_connected: self.jetpack,
            is_visible: self.visible,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ThemesResponse {
    #[serde(default)]
    pub themes: Vec<ThemeWire>,
}

/// Themes are priced either with a display string or a structured price.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PriceWire {
    Text(String),
    Detailed {
        #[serde(default)]
        value: f64,
        #[serde(default)]
        display: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct ThemeWire {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_uri: String,
    #[serde(default)]
    pub screenshot: String,
    #[serde(default)]
    pub demo_uri: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub stylesheet: String,
    #[serde(default)]
    pub price: Option<PriceWire>,
    #[serde(default)]
    pub active: bool,
}

impl ThemeWire {
    pub fn into_model(self) -> ThemeModel {
        let (free, price_text) = match self.price {
            None => (true, String::new()),
            Some(PriceWire::Text(text)) => (text.trim().is_empty(), text),
            Some(PriceWire::Detailed { value, display }) => (value <= 0.0, display),
        };
        ThemeModel {
            id: None,
            local_site_id: None,
            theme_id: self.id,
            name: self.name,
            description: self.description,
            author_name: self.author,
            author_url: self.author_uri,
            screenshot_url: self.screenshot,
            demo_url: self.demo_uri,
            version: self.version,
            stylesheet: self.stylesheet,
            price_text,
            free,
            active: self.active,
            is_wpcom_theme: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostsResponse {
    #[serde(default)]
    pub found: u32,
    #[serde(default)]
    pub posts: Vec<PostWire>,
}

#[derive(Debug, Deserialize)]
pub struct PostWire {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub post_type: String,
}

impl PostWire {
    pub fn into_model(self, site: LocalId) -> PostModel {
        PostModel {
            id: None,
            local_site_id: site,
            remote_post_id: Some(RemoteId(self.id)),
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            status: self.status,
            date_created: self.date,
            is_page: self.post_type == "page",
            is_local_draft: false,
            is_locally_changed: false,
        }
    }
}

pub fn post_request_body(post: &PostModel) -> Value {
    let mut body = json!({
        "title": post.title,
        "content": post.content,
        "excerpt": post.excerpt,
        "type": if post.is_page { "page" } else { "post" },
    });
    if !post.status.is_empty() {
        body["status"] = json!(post.status);
    }
    if !post.date_created.is_empty() {
        body["date"] = json!(post.date_created);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_site_list() {
        let body = r#"{"sites":[
            {"ID":556,"name":"Dotcom","URL":"https://dotcom.wordpress.com","jetpack":false,"visible":true},
            {"ID":982,"name":"JP","URL":"http://jetpack.url","jetpack":true,
             "options":{"xmlrpc_url":"http://jetpack.url/xmlrpc.php"}}
        ]}"#;
        let resp: SitesResponse = serde_json::from_str(body).unwrap();
        let sites: Vec<SiteModel> = resp.sites.into_iter().map(SiteWire::into_model).collect();
        assert!(sites[0].is_wpcom && !sites[0].is_jetpack_connected);
        assert!(sites[1].is_jetpack_connected && sites[1].uses_rest_api());
        assert_eq!(sites[1].xmlrpc_url.as_deref(), Some("http://jetpack.url/xmlrpc.php"));
        assert!(sites[1].is_visible);
    }

    #[test]
    fn parses_theme_prices() {
        let body = r#"{"found":2,"themes":[
            {"id":"edin","name":"Edin","author":"Automattic","price":{"value":0,"currency":"USD","display":""}},
            {"id":"label","name":"Label","price":"$50"},
            {"id":"twentysixteen","name":"Twenty Sixteen","active":true}
        ]}"#;
        let resp: ThemesResponse = serde_json::from_str(body).unwrap();
        let themes: Vec<ThemeModel> = resp.themes.into_iter().map(ThemeWire::into_model).collect();
        assert!(themes[0].free);
        assert_eq!(themes[0].author_name, "Automattic");
        assert!(!themes[1].free);
        assert_eq!(themes[1].price_text, "$50");
        assert!(themes[2].free && themes[2].active);
    }

    #[test]
    fn parses_posts_and_pages() {
        let body = r#"{"found":2,"posts":[
            {"ID":12,"date":"2016-03-01T10:00:00+00:00","title":"Hello","content":"<p>hi</p>","status":"publish","type":"post"},
            {"ID":13,"title":"About","status":"draft","type":"page"}
        ]}"#;
        let resp: PostsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.found, 2);
        let posts: Vec<PostModel> = resp
            .posts
            .into_iter()
            .map(|p| p.into_model(LocalId(6)))
            .collect();
        assert_eq!(posts[0].remote_post_id, Some(RemoteId(12)));
        assert_eq!(posts[0].local_site_id, LocalId(6));
        assert!(!posts[0].is_page);
        assert!(posts[1].is_page);
    }

    #[test]
    fn push_body_skips_empty_fields() {
        let mut post = PostModel::new(LocalId(1));
        post.title = "Draft".into();
        let body = post_request_body(&post);
        assert_eq!(body["type"], "post");
        assert!(body.get("status").is_none());
        assert!(body.get("date").is_none());
    }
}
