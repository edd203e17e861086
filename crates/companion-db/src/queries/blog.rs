use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use companion_types::api::NameCount;
use companion_types::models::{BlogPost, PostStatus};

use crate::{Database, OptionalExt, decode_list, encode_list, now, parse_opt_ts, parse_ts};

const POST_COLUMNS: &str = "id, title, slug, content, excerpt, meta_description, meta_keywords, category, tags, featured_image, author, status, published_at, views, created_at, updated_at";

fn post_from_row(row: &Row) -> rusqlite::Result<BlogPost> {
    let status: String = row.get(11)?;
    Ok(BlogPost {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        meta_description: row.get(5)?,
        meta_keywords: decode_list(&row.get::<_, String>(6)?),
        category: row.get(7)?,
        tags: decode_list(&row.get::<_, String>(8)?),
        featured_image: row.get(9)?,
        author: row.get(10)?,
        status: PostStatus::parse(&status).unwrap_or(PostStatus::Draft),
        published_at: parse_opt_ts(row.get(12)?),
        views: row.get(13)?,
        created_at: parse_ts(&row.get::<_, String>(14)?),
        updated_at: parse_ts(&row.get::<_, String>(15)?),
    })
}

/// Editable fields of a post.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub meta_description: String,
    pub meta_keywords: Vec<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub author: String,
    pub status: PostStatus,
}

impl From<BlogPost> for PostDraft {
    fn from(post: BlogPost) -> Self {
        Self {
            title: post.title,
            slug: post.slug,
            content: post.content,
            excerpt: post.excerpt,
            meta_description: post.meta_description,
            meta_keywords: post.meta_keywords,
            category: post.category,
            tags: post.tags,
            featured_image: post.featured_image,
            author: post.author,
            status: post.status,
        }
    }
}

const PUBLISHED_FILTER: &str = "status = 'published'
    AND (?1 IS NULL OR category = ?1)
    AND (?2 IS NULL OR EXISTS (SELECT 1 FROM json_each(blog_posts.tags) t WHERE t.value = ?2))";

impl Database {
    /// Whether another post already uses `slug`.
    pub fn slug_taken(&self, slug: &str, except_id: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM blog_posts WHERE slug = ?1 AND (?2 IS NULL OR id != ?2)",
                (slug, except_id),
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn create_post(&self, draft: &PostDraft) -> Result<BlogPost> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            let ts = now();
            let published_at = (draft.status == PostStatus::Published).then(|| ts.clone());
            conn.execute(
                "INSERT INTO blog_posts
                    (id, title, slug, content, excerpt, meta_description, meta_keywords, category, tags,
                     featured_image, author, status, published_at, views, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?14)",
                rusqlite::params![
                    id,
                    draft.title,
                    draft.slug,
                    draft.content,
                    draft.excerpt,
                    draft.meta_description,
                    encode_list(&draft.meta_keywords),
                    draft.category,
                    encode_list(&draft.tags),
                    draft.featured_image,
                    draft.author,
                    draft.status.as_str(),
                    published_at,
                    ts,
                ],
            )?;
            query_post(conn, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("Post vanished after insert: {}", id))
        })
    }

    /// Overwrite a post. `published_at` is stamped on the first transition to published.
    pub fn update_post(&self, id: &str, draft: &PostDraft) -> Result<Option<BlogPost>> {
        self.with_conn(|conn| {
            let ts = now();
            let n = conn.execute(
                "UPDATE blog_posts SET
                    title = ?1, slug = ?2, content = ?3, excerpt = ?4, meta_description = ?5,
                    meta_keywords = ?6, category = ?7, tags = ?8, featured_image = ?9, author = ?10,
                    status = ?11,
                    published_at = CASE WHEN ?11 = 'published' THEN COALESCE(published_at, ?12) ELSE published_at END,
                    updated_at = ?12
                 WHERE id = ?13",
                rusqlite::params![
                    draft.title,
                    draft.slug,
                    draft.content,
                    draft.excerpt,
                    draft.meta_description,
                    encode_list(&draft.meta_keywords),
                    draft.category,
                    encode_list(&draft.tags),
                    draft.featured_image,
                    draft.author,
                    draft.status.as_str(),
                    ts,
                    id,
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_post(conn, "id", id)
        })
    }

    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM blog_posts WHERE id = ?1", [id])? > 0))
    }

    pub fn get_post(&self, id: &str) -> Result<Option<BlogPost>> {
        self.with_conn(|conn| query_post(conn, "id", id))
    }

    pub fn list_all_posts(&self) -> Result<Vec<BlogPost>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM blog_posts ORDER BY created_at DESC", POST_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One page of published posts, newest first, plus the total match count.
    pub fn published_posts(
        &self,
        page: u32,
        limit: u32,
        category: Option<&str>,
        tag: Option<&str>,
    ) -> Result<(Vec<BlogPost>, i64)> {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM blog_posts WHERE {}", PUBLISHED_FILTER),
                (category, tag),
                |r| r.get(0),
            )?;
            let sql = format!(
                "SELECT {} FROM blog_posts WHERE {} ORDER BY published_at DESC LIMIT ?3 OFFSET ?4",
                POST_COLUMNS, PUBLISHED_FILTER
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((category, tag, limit, offset), post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Published post by slug; each successful lookup counts as a view.
    pub fn view_published_post(&self, slug: &str) -> Result<Option<BlogPost>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE blog_posts SET views = views + 1 WHERE slug = ?1 AND status = 'published'",
                [slug],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_post(conn, "slug", slug)
        })
    }

    pub fn post_categories(&self) -> Result<Vec<NameCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) AS n FROM blog_posts WHERE status = 'published'
                 GROUP BY category ORDER BY n DESC, category",
            )?;
            let rows = stmt
                .query_map([], |row| Ok(NameCount { name: row.get(0)?, count: row.get(1)? }))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn post_tags(&self) -> Result<Vec<NameCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.value, COUNT(*) AS n FROM blog_posts p, json_each(p.tags) t
                 WHERE p.status = 'published'
                 GROUP BY t.value ORDER BY n DESC, t.value",
            )?;
            let rows = stmt
                .query_map([], |row| Ok(NameCount { name: row.get(0)?, count: row.get(1)? }))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Up to `limit` other published posts in the same category or sharing a tag.
    /// `None` unless `slug` names a published post.
    pub fn related_posts(&self, slug: &str, limit: u32) -> Result<Option<Vec<BlogPost>>> {
        self.with_conn(|conn| {
            let Some(post) = query_post(conn, "slug", slug)?.filter(|p| p.status == PostStatus::Published) else {
                return Ok(None);
            };
            let sql = format!(
                "SELECT {} FROM blog_posts
                 WHERE status = 'published' AND id != ?1
                   AND (category = ?2 OR EXISTS (
                        SELECT 1 FROM json_each(blog_posts.tags) t
                        WHERE t.value IN (SELECT value FROM json_each(?3))))
                 ORDER BY published_at DESC LIMIT ?4",
                POST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![post.id, post.category, encode_list(&post.tags), limit],
                    post_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(rows))
        })
    }
}

fn query_post(conn: &Connection, column: &str, value: &str) -> Result<Option<BlogPost>> {
    let sql = format!("SELECT {} FROM blog_posts WHERE {} = ?1", POST_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], post_from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    fn draft(slug: &str, category: &str, tags: &[&str], status: PostStatus) -> PostDraft {
        PostDraft {
            title: format!("Post {}", slug),
            slug: slug.to_string(),
            content: "Body".into(),
            excerpt: "Short".into(),
            meta_description: "Meta".into(),
            meta_keywords: vec![],
            category: category.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            featured_image: None,
            author: "Admin".into(),
            status,
        }
    }

    #[test]
    fn drafts_stay_private() {
        let db = fixtures::db();
        db.create_post(&draft("hidden", "General", &[], PostStatus::Draft)).unwrap();
        let live = db.create_post(&draft("live", "General", &["ai"], PostStatus::Published)).unwrap();
        assert!(live.published_at.is_some());

        let (posts, total) = db.published_posts(1, 10, None, None).unwrap();
        assert_eq!(total, 1);
        assert_eq!(posts[0].slug, "live");
        assert!(db.view_published_post("hidden").unwrap().is_none());

        let viewed = db.view_published_post("live").unwrap().unwrap();
        assert_eq!(viewed.views, 1);
    }

    #[test]
    fn publish_stamps_once() {
        let db = fixtures::db();
        let post = db.create_post(&draft("p", "General", &[], PostStatus::Draft)).unwrap();
        assert!(post.published_at.is_none());

        let mut edit = PostDraft::from(post.clone());
        edit.status = PostStatus::Published;
        let published = db.update_post(&post.id, &edit).unwrap().unwrap();
        let stamp = published.published_at.unwrap();

        edit.title = "Renamed".into();
        let again = db.update_post(&post.id, &edit).unwrap().unwrap();
        assert_eq!(again.published_at, Some(stamp));
        assert!(db.slug_taken("p", None).unwrap());
        assert!(!db.slug_taken("p", Some(&post.id)).unwrap());
    }

    #[test]
    fn filters_and_related() {
        let db = fixtures::db();
        db.create_post(&draft("a", "Tips", &["dating"], PostStatus::Published)).unwrap();
        db.create_post(&draft("b", "News", &["dating", "ai"], PostStatus::Published)).unwrap();
        db.create_post(&draft("c", "News", &["ai"], PostStatus::Published)).unwrap();
        db.create_post(&draft("d", "Other", &["misc"], PostStatus::Published)).unwrap();

        assert_eq!(db.published_posts(1, 10, Some("News"), None).unwrap().1, 2);
        assert_eq!(db.published_posts(1, 10, None, Some("dating")).unwrap().1, 2);
        assert_eq!(db.published_posts(2, 3, None, None).unwrap().0.len(), 1);

        let related = db.related_posts("a", 3).unwrap().unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].slug, "b");
        assert!(db.related_posts("missing", 3).unwrap().is_none());

        let tags = db.post_tags().unwrap();
        assert_eq!(tags.iter().find(|t| t.name == "ai").unwrap().count, 2);
        assert_eq!(db.post_categories().unwrap()[0].name, "News");
    }

    #[test]
    fn draft_has_no_related_posts() {
        let db = fixtures::db();
        db.create_post(&draft("unreleased", "Tips", &["dating"], PostStatus::Draft)).unwrap();
        db.create_post(&draft("sibling", "Tips", &["dating"], PostStatus::Published)).unwrap();

        assert!(db.related_posts("unreleased", 3).unwrap().is_none());
        assert_eq!(db.related_posts("sibling", 3).unwrap().unwrap().len(), 0);
    }
}
