//! 上游响应体解析
//!
//! 非 JSON 响应体归为 `InvalidResponse`（本轮跳过），缺少 `_embedded` 列表归为 `NotFound`。

use crate::error::FetchError;
use crate::model::{id_from_value, Post, Reply, ReplySnapshot, ThreadContext};
use serde_json::Value;

const THREADS_KEY: &str = "threads";
const POSTS_KEY: &str = "doc:posts";
const THREAD_KEY: &str = "thread";

fn parse_json(body: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::InvalidResponse(e.to_string()))
}

/// 取 `_embedded[key][0]`
fn first_embedded<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    doc.get("_embedded")
        .and_then(|e| e.get(key))
        .and_then(Value::as_array)
        .and_then(|items| items.first())
}

/// 取 `_embedded["doc:posts"]` 中第一条真正的回复，跳过讨论串首帖（`isReply: false`）
fn first_reply(doc: &Value) -> Option<&Value> {
    doc.get("_embedded")
        .and_then(|e| e.get(POSTS_KEY))
        .and_then(Value::as_array)?
        .iter()
        .find(|item| item.get("isReply").and_then(Value::as_bool) != Some(false))
}

/// 解析 wiki siteinfo 响应中的 wiki ID（`query.wikidesc.id`）
pub fn parse_wiki_id(body: &str) -> Result<String, FetchError> {
    let doc = parse_json(body)?;
    doc.pointer("/query/wikidesc/id")
        .and_then(id_from_value)
        .ok_or_else(|| FetchError::NotFound("query.wikidesc.id".to_string()))
}

/// 解析 threads 列表响应中的最新帖子
pub fn parse_latest_post(body: &str) -> Result<Post, FetchError> {
    let doc = parse_json(body)?;
    let item = first_embedded(&doc, THREADS_KEY)
        .ok_or_else(|| FetchError::NotFound(format!("_embedded.{}", THREADS_KEY)))?;

    serde_json::from_value(item.clone())
        .map_err(|e| FetchError::InvalidResponse(format!("malformed thread: {}", e)))
}

/// 解析全站 posts 列表响应中的最新回复
///
/// 父级讨论串优先取回复自带的 `_embedded.thread[0]`，其次取文档级的，
/// 都没有时退回回复自身字段。posts 列表也包含讨论串首帖，首帖不算回复。
pub fn parse_latest_reply(body: &str) -> Result<ReplySnapshot, FetchError> {
    let doc = parse_json(body)?;
    let item = first_reply(&doc)
        .ok_or_else(|| FetchError::NotFound(format!("reply in _embedded.{}", POSTS_KEY)))?;

    let reply: Reply = serde_json::from_value(item.clone())
        .map_err(|e| FetchError::InvalidResponse(format!("malformed reply: {}", e)))?;

    let thread = first_embedded(item, THREAD_KEY)
        .or_else(|| first_embedded(&doc, THREAD_KEY))
        .and_then(|t| thread_context(t, &reply))
        .unwrap_or_else(|| reply.fallback_thread());

    Ok(ReplySnapshot {
        reply,
        thread,
        raw: doc,
    })
}

/// 解析单个讨论串响应（`responseGroup=full&limit=1`）中的最新回复
///
/// 文档顶层就是讨论串本身，回复在 `_embedded["doc:posts"][0]`。
pub fn parse_thread_reply(body: &str, thread_id: &str) -> Result<ReplySnapshot, FetchError> {
    let doc = parse_json(body)?;
    let mut item = first_reply(&doc)
        .cloned()
        .ok_or_else(|| FetchError::NotFound(format!("reply in _embedded.{}", POSTS_KEY)))?;

    if item.get("threadId").is_none() {
        if let Some(obj) = item.as_object_mut() {
            obj.insert("threadId".to_string(), Value::String(thread_id.to_string()));
        }
    }

    let reply: Reply = serde_json::from_value(item)
        .map_err(|e| FetchError::InvalidResponse(format!("malformed reply: {}", e)))?;

    let thread = thread_context(&doc, &reply).unwrap_or_else(|| reply.fallback_thread());

    Ok(ReplySnapshot {
        reply,
        thread,
        raw: doc,
    })
}

/// 讨论串文档缺少的字段用回复中的同名字段补齐
fn thread_context(value: &Value, reply: &Reply) -> Option<ThreadContext> {
    let mut thread: ThreadContext = serde_json::from_value(value.clone()).ok()?;
    if thread.forum_id.is_empty() {
        thread.forum_id = reply.forum_id.clone();
    }
    if thread.forum_name.is_empty() {
        thread.forum_name = reply.forum_name.clone();
    }
    Some(thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wiki_id() {
        let body = json!({"query": {"wikidesc": {"id": 831}}}).to_string();
        assert_eq!(parse_wiki_id(&body).unwrap(), "831");

        let body = json!({"query": {}}).to_string();
        assert!(matches!(parse_wiki_id(&body), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_parse_latest_post() {
        let body = json!({
            "_embedded": {"threads": [
                {"id": "100", "title": "Hello", "forumId": "5", "forumName": "General",
                 "createdBy": {"name": "Alice", "avatarUrl": "https://img/a.png"}, "rawContent": "hi"},
                {"id": "99", "title": "Older", "createdBy": {"name": "Bob"}}
            ]}
        })
        .to_string();

        let post = parse_latest_post(&body).unwrap();
        assert_eq!(post.id, "100");
        assert_eq!(post.title, "Hello");
        assert_eq!(post.created_by.avatar_url.as_deref(), Some("https://img/a.png"));
    }

    #[test]
    fn test_non_json_body_is_invalid_response() {
        let err = parse_latest_post("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(err.is_graceful_skip());

        let err = parse_latest_reply("").unwrap_err();
        assert!(err.is_graceful_skip());
    }

    #[test]
    fn test_empty_embedded_is_not_found() {
        let body = json!({"_embedded": {"threads": []}}).to_string();
        assert!(matches!(parse_latest_post(&body), Err(FetchError::NotFound(_))));

        let body = json!({"id": "1"}).to_string();
        assert!(matches!(parse_thread_reply(&body, "1"), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_parse_latest_reply_uses_embedded_thread() {
        let body = json!({
            "_embedded": {"doc:posts": [{
                "id": "201", "threadId": "100", "forumId": "5", "forumName": "General",
                "createdBy": {"name": "Bob"}, "rawContent": "agreed",
                "_embedded": {"thread": [{"id": "100", "title": "Hello"}]}
            }]}
        })
        .to_string();

        let snapshot = parse_latest_reply(&body).unwrap();
        assert_eq!(snapshot.reply.id, "201");
        assert_eq!(snapshot.thread.id, "100");
        assert_eq!(snapshot.thread.title, "Hello");
        assert_eq!(snapshot.thread.forum_name, "General");
    }

    #[test]
    fn test_parse_latest_reply_falls_back_to_reply_fields() {
        let body = json!({
            "_embedded": {"doc:posts": [{
                "id": "202", "threadId": "100", "forumName": "General",
                "createdBy": {"name": "Bob"}
            }]}
        })
        .to_string();

        let snapshot = parse_latest_reply(&body).unwrap();
        assert_eq!(snapshot.thread.id, "100");
        assert_eq!(snapshot.thread.forum_name, "General");
    }

    #[test]
    fn test_opening_post_is_not_a_reply() {
        let body = json!({
            "_embedded": {"doc:posts": [{
                "id": "5001", "threadId": "100", "isReply": false,
                "createdBy": {"name": "Alice"}, "rawContent": "First!"
            }]}
        })
        .to_string();
        assert!(matches!(parse_latest_reply(&body), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_parse_latest_reply_skips_opening_posts() {
        let body = json!({
            "_embedded": {"doc:posts": [
                {"id": "5002", "threadId": "101", "isReply": false, "createdBy": {"name": "Alice"}},
                {"id": "5001", "threadId": "100", "isReply": true, "createdBy": {"name": "Bob"}}
            ]}
        })
        .to_string();

        let snapshot = parse_latest_reply(&body).unwrap();
        assert_eq!(snapshot.reply.id, "5001");
        assert_eq!(snapshot.reply.parent_thread_id, "100");
    }

    #[test]
    fn test_parse_thread_reply_fills_thread_id() {
        let body = json!({
            "id": "100", "title": "Hello", "forumId": "5", "forumName": "General",
            "_embedded": {"doc:posts": [{"id": "300", "createdBy": {"name": "Eve"}, "rawContent": "reply"}]}
        })
        .to_string();

        let snapshot = parse_thread_reply(&body, "100").unwrap();
        assert_eq!(snapshot.reply.id, "300");
        assert_eq!(snapshot.reply.parent_thread_id, "100");
        assert_eq!(snapshot.thread.title, "Hello");
        assert_eq!(snapshot.raw["title"], "Hello");
    }

    #[test]
    fn test_malformed_item_is_invalid_response() {
        let body = json!({"_embedded": {"threads": [{"title": "no id"}]}}).to_string();
        assert!(matches!(parse_latest_post(&body), Err(FetchError::InvalidResponse(_))));
    }
}
