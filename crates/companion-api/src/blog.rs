use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Value, json};

use companion_db::queries::PostDraft;
use companion_types::api::{BlogPostPage, BlogPostRequest, BlogPostUpdateRequest, MessageResponse};
use companion_types::models::{BlogPost, PostStatus};

use crate::admin::{Activity, log_activity};
use crate::error::ApiError;
use crate::middleware::AuthAdmin;
use crate::state::AppState;

const RELATED_LIMIT: u32 = 3;
const MAX_PAGE_SIZE: u32 = 50;
const STATIC_PAGES: &[(&str, &str)] = &[
    ("/", "daily"),
    ("/characters", "daily"),
    ("/blog", "daily"),
    ("/subscription", "weekly"),
];

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub category: Option<String>,
    pub tag: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

fn parse_status(raw: &str) -> Result<PostStatus, ApiError> {
    PostStatus::parse(raw).ok_or_else(|| ApiError::bad_request("Status must be draft or published"))
}

fn slug_conflict() -> ApiError {
    ApiError::bad_request("A post with this slug already exists")
}

// -- Admin CMS --

pub async fn admin_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let posts = state.db(|db| db.list_all_posts()).await?;
    Ok(Json(json!({ "posts": posts })))
}

pub async fn admin_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BlogPost>, ApiError> {
    state
        .db(move |db| db.get_post(&id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Json(req): Json<BlogPostRequest>,
) -> Result<Json<Value>, ApiError> {
    let slug = req.slug.trim().to_string();
    if req.title.trim().is_empty() || slug.is_empty() {
        return Err(ApiError::bad_request("Title and slug are required"));
    }
    let draft = PostDraft {
        title: req.title.trim().to_string(),
        slug,
        content: req.content,
        excerpt: req.excerpt,
        meta_description: req.meta_description,
        meta_keywords: req.meta_keywords,
        category: req.category,
        tags: req.tags,
        featured_image: req.featured_image,
        author: req.author.unwrap_or_else(|| caller.email.clone()),
        status: parse_status(&req.status)?,
    };

    let post = state
        .db(move |db| {
            if db.slug_taken(&draft.slug, None)? {
                return Ok(None);
            }
            db.create_post(&draft).map(Some)
        })
        .await?
        .ok_or_else(slug_conflict)?;

    log_activity(&state, &caller, Activity::new("create_blog_post").target("blog_post", &post.id).details(post.title.clone()))
        .await?;
    Ok(Json(json!({ "post": post })))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
    Json(req): Json<BlogPostUpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    let status = req.status.as_deref().map(parse_status).transpose()?;

    enum Outcome {
        Updated(BlogPost),
        Missing,
        SlugTaken,
    }

    let target = id.clone();
    let outcome = state
        .db(move |db| {
            let Some(current) = db.get_post(&target)? else {
                return Ok(Outcome::Missing);
            };
            let mut draft = PostDraft::from(current);
            if let Some(slug) = req.slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
                if db.slug_taken(&slug, Some(&target))? {
                    return Ok(Outcome::SlugTaken);
                }
                draft.slug = slug;
            }
            if let Some(title) = req.title {
                draft.title = title;
            }
            if let Some(content) = req.content {
                draft.content = content;
            }
            if let Some(excerpt) = req.excerpt {
                draft.excerpt = excerpt;
            }
            if let Some(meta) = req.meta_description {
                draft.meta_description = meta;
            }
            if let Some(keywords) = req.meta_keywords {
                draft.meta_keywords = keywords;
            }
            if let Some(category) = req.category {
                draft.category = category;
            }
            if let Some(tags) = req.tags {
                draft.tags = tags;
            }
            if req.featured_image.is_some() {
                draft.featured_image = req.featured_image;
            }
            if let Some(author) = req.author {
                draft.author = author;
            }
            if let Some(status) = status {
                draft.status = status;
            }
            Ok(match db.update_post(&target, &draft)? {
                Some(post) => Outcome::Updated(post),
                None => Outcome::Missing,
            })
        })
        .await?;

    let post = match outcome {
        Outcome::Updated(post) => post,
        Outcome::Missing => return Err(ApiError::not_found("Post not found")),
        Outcome::SlugTaken => return Err(slug_conflict()),
    };
    log_activity(&state, &caller, Activity::new("update_blog_post").target("blog_post", id)).await?;
    Ok(Json(json!({ "post": post })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = id.clone();
    if !state.db(move |db| db.delete_post(&target)).await? {
        return Err(ApiError::not_found("Post not found"));
    }
    log_activity(&state, &caller, Activity::new("delete_blog_post").target("blog_post", id)).await?;
    Ok(Json(MessageResponse::new("Post deleted")))
}

// -- Public --

pub async fn list_published(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<BlogPostPage>, ApiError> {
    let page = q.page.max(1);
    let limit = q.limit.clamp(1, MAX_PAGE_SIZE);
    let (posts, total) = state
        .db(move |db| {
            db.published_posts(
                page,
                limit,
                q.category.as_deref().filter(|c| !c.is_empty()),
                q.tag.as_deref().filter(|t| !t.is_empty()),
            )
        })
        .await?;

    let pages = u32::try_from(total).unwrap_or(u32::MAX).div_ceil(limit);
    Ok(Json(BlogPostPage { posts, total, page, pages }))
}

pub async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPost>, ApiError> {
    state
        .db(move |db| db.view_published_post(&slug))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let categories = state.db(|db| db.post_categories()).await?;
    Ok(Json(json!({ "categories": categories })))
}

pub async fn tags(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tags = state.db(|db| db.post_tags()).await?;
    Ok(Json(json!({ "tags": tags })))
}

pub async fn related(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let related = state
        .db(move |db| db.related_posts(&slug, RELATED_LIMIT))
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    Ok(Json(json!({ "related": related })))
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn render_sitemap(site_url: &str, posts: &[BlogPost]) -> String {
    let base = site_url.trim_end_matches('/');
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for (path, freq) in STATIC_PAGES {
        xml.push_str(&format!(
            "  <url><loc>{}</loc><changefreq>{}</changefreq></url>\n",
            xml_escape(&format!("{}{}", base, path)),
            freq
        ));
    }
    for post in posts.iter().filter(|p| p.status == PostStatus::Published) {
        let loc = xml_escape(&format!("{}/blog/{}", base, post.slug));
        let lastmod = post.updated_at.format("%Y-%m-%d");
        xml.push_str(&format!(
            "  <url><loc>{}</loc><lastmod>{}</lastmod><changefreq>monthly</changefreq></url>\n",
            loc, lastmod
        ));
    }
    xml.push_str("</urlset>\n");
    xml
}

pub async fn sitemap(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let posts = state.db(|db| db.list_all_posts()).await?;
    let xml = render_sitemap(&state.config.site_url, &posts);
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(slug: &str, status: PostStatus) -> BlogPost {
        BlogPost {
            id: slug.into(),
            title: slug.into(),
            slug: slug.into(),
            content: String::new(),
            excerpt: String::new(),
            meta_description: String::new(),
            meta_keywords: Vec::new(),
            category: "General".into(),
            tags: Vec::new(),
            featured_image: None,
            author: "Admin".into(),
            status,
            published_at: None,
            views: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn sitemap_lists_only_published_posts() {
        let xml = render_sitemap(
            "https://example.com/",
            &[post("hello-world", PostStatus::Published), post("secret", PostStatus::Draft)],
        );
        assert!(xml.contains("<loc>https://example.com/characters</loc>"));
        assert!(xml.contains("<loc>https://example.com/blog/hello-world</loc>"));
        assert!(!xml.contains("secret"));
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[test]
    fn escapes_xml() {
        assert_eq!(xml_escape("a&b<c>"), "a&amp;b&lt;c&gt;");
    }
}
