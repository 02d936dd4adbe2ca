//! Reference upstream: a small Reddit-flavored `UpstreamApiPort`, and
//! in-memory `ToolRegistry`/`PromptRegistry`/`ResourceRegistry`
//! implementations built against it. Swapping upstreams means writing a new
//! module shaped like this one, not touching `McpInstance`.

use std::sync::Arc;

use async_trait::async_trait;
use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::types::{Prompt, PromptArgument, Resource, ResourceContents, Tool, ToolCallResult};
use serde::Deserialize;
use serde_json::json;

use crate::ports::{HandlerContext, PromptRegistry, ResourceRegistry, ToolRegistry, UpstreamApiPort, UpstreamPost};

pub struct RedditApiClient {
    http: reqwest::Client,
    user_agent: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ListingResponse {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    title: String,
    author: String,
    score: i64,
    url: String,
}

#[derive(Deserialize)]
struct AboutMeResponse {
    name: String,
}

impl RedditApiClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            user_agent: user_agent.into(),
            base_url: "https://oauth.reddit.com".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl UpstreamApiPort for RedditApiClient {
    async fn list_subreddit_posts(&self, subreddit: &str, access_token: &str, limit: u32) -> GatewayResult<Vec<UpstreamPost>> {
        let response = self
            .http
            .get(format!("{}/r/{subreddit}/hot", self.base_url))
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamError(format!("upstream listing endpoint returned {}", response.status())));
        }

        let body: ListingResponse = response.json().await.map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        Ok(body
            .data
            .children
            .into_iter()
            .map(|child| UpstreamPost {
                id: child.data.id,
                title: child.data.title,
                author: child.data.author,
                score: child.data.score,
                url: child.data.url,
            })
            .collect())
    }

    async fn about_me(&self, access_token: &str) -> GatewayResult<String> {
        let response = self
            .http
            .get(format!("{}/api/v1/me", self.base_url))
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamError(format!("upstream identity endpoint returned {}", response.status())));
        }

        let body: AboutMeResponse = response.json().await.map_err(|e| GatewayError::UpstreamError(e.to_string()))?;
        Ok(body.name)
    }
}

/// The single real tool in the reference catalog: fetches the hot listing
/// of a subreddit through `UpstreamApiPort`.
pub struct RedditToolRegistry {
    upstream: Arc<dyn UpstreamApiPort>,
}

impl RedditToolRegistry {
    pub fn new(upstream: Arc<dyn UpstreamApiPort>) -> Self {
        Self { upstream }
    }

    fn list_subreddit_posts_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["subreddit"],
            "properties": {
                "subreddit": {"type": "string"},
                "limit": {"type": "integer"}
            }
        })
    }
}

#[derive(Deserialize)]
struct ListSubredditPostsArgs {
    subreddit: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    10
}

#[async_trait]
impl ToolRegistry for RedditToolRegistry {
    fn list_tools(&self) -> Vec<Tool> {
        vec![Tool {
            name: "list_subreddit_posts".to_string(),
            description: "Lists the hot posts in a subreddit".to_string(),
            input_schema: Self::list_subreddit_posts_schema(),
            output_schema: None,
        }]
    }

    fn input_schema(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "list_subreddit_posts" => Some(Self::list_subreddit_posts_schema()),
            _ => None,
        }
    }

    async fn call(&self, name: &str, arguments: serde_json::Value, ctx: &HandlerContext) -> GatewayResult<ToolCallResult> {
        match name {
            "list_subreddit_posts" => {
                let args: ListSubredditPostsArgs =
                    serde_json::from_value(arguments).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
                let token = ctx.requires_upstream()?;
                let posts = self.upstream.list_subreddit_posts(&args.subreddit, token, args.limit).await?;
                ctx.emit_progress(json!({"subreddit": args.subreddit, "fetched": posts.len()}));
                let body = serde_json::to_string(&posts).map_err(|e| GatewayError::Serialization { source: e })?;
                Ok(ToolCallResult::text(body))
            }
            other => Err(GatewayError::NotFound(other.to_string())),
        }
    }
}

/// A single `post_summary` prompt referencing the `reddit://about` resource
/// under the `account` placeholder.
pub struct RedditPromptRegistry;

impl PromptRegistry for RedditPromptRegistry {
    fn list_prompts(&self) -> Vec<Prompt> {
        vec![post_summary_prompt()]
    }

    fn get_prompt(&self, name: &str) -> Option<Prompt> {
        match name {
            "post_summary" => Some(post_summary_prompt()),
            _ => None,
        }
    }
}

fn post_summary_prompt() -> Prompt {
    let mut resource_refs = std::collections::HashMap::new();
    resource_refs.insert("account".to_string(), "reddit://about".to_string());
    Prompt {
        name: "post_summary".to_string(),
        description: "Summarizes a post title for the authenticated account".to_string(),
        arguments: vec![PromptArgument {
            name: "title".to_string(),
            description: "The post title to summarize".to_string(),
            required: true,
        }],
        template: "Summarize this Reddit post for {{resource_account}}: {{title}}".to_string(),
        resource_refs,
    }
}

/// The single `reddit://about` resource: the authenticated account's own
/// identity, fetched fresh on every read.
pub struct RedditResourceRegistry {
    upstream: Arc<dyn UpstreamApiPort>,
}

impl RedditResourceRegistry {
    pub fn new(upstream: Arc<dyn UpstreamApiPort>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl ResourceRegistry for RedditResourceRegistry {
    fn list_resources(&self) -> Vec<Resource> {
        vec![Resource {
            uri: "reddit://about".to_string(),
            name: "about".to_string(),
            mime_type: "text/plain".to_string(),
            requires_upstream: true,
        }]
    }

    async fn read(&self, uri: &str, ctx: &HandlerContext) -> GatewayResult<ResourceContents> {
        match uri {
            "reddit://about" => {
                let token = ctx.requires_upstream()?;
                let name = self.upstream.about_me(token).await?;
                Ok(ResourceContents {
                    uri: uri.to_string(),
                    mime_type: "text/plain".to_string(),
                    text: name,
                })
            }
            other => Err(GatewayError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::types::ContentBlock;
    use gateway_transport::StreamTransport;

    struct StubUpstream;

    #[async_trait]
    impl UpstreamApiPort for StubUpstream {
        async fn list_subreddit_posts(&self, subreddit: &str, _access_token: &str, _limit: u32) -> GatewayResult<Vec<UpstreamPost>> {
            Ok(vec![UpstreamPost {
                id: "abc".to_string(),
                title: format!("hello from {subreddit}"),
                author: "someone".to_string(),
                score: 42,
                url: "https://reddit.com/r/test/abc".to_string(),
            }])
        }

        async fn about_me(&self, _access_token: &str) -> GatewayResult<String> {
            Ok("test_user".to_string())
        }
    }

    fn ctx_with_token(token: Option<&str>) -> HandlerContext {
        HandlerContext {
            session_id: "S-1".to_string(),
            upstream_access_token: token.map(str::to_string),
            upstream_refresh_token: None,
            request_id: None,
            transport: StreamTransport::new(),
        }
    }

    #[tokio::test]
    async fn list_subreddit_posts_requires_upstream_credentials() {
        let registry = RedditToolRegistry::new(Arc::new(StubUpstream));
        let ctx = ctx_with_token(None);
        let result = registry.call("list_subreddit_posts", json!({"subreddit": "rust"}), &ctx).await;
        assert!(matches!(result, Err(GatewayError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn list_subreddit_posts_returns_serialized_posts() {
        let registry = RedditToolRegistry::new(Arc::new(StubUpstream));
        let ctx = ctx_with_token(Some("tok"));
        let result = registry.call("list_subreddit_posts", json!({"subreddit": "rust"}), &ctx).await.unwrap();
        let ContentBlock::Text { text } = &result.content[0] else { panic!("expected text block") };
        assert!(text.contains("hello from rust"));
    }

    #[tokio::test]
    async fn about_resource_requires_upstream_credentials() {
        let registry = RedditResourceRegistry::new(Arc::new(StubUpstream));
        let ctx = ctx_with_token(None);
        let result = registry.read("reddit://about", &ctx).await;
        assert!(matches!(result, Err(GatewayError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn about_resource_reads_identity() {
        let registry = RedditResourceRegistry::new(Arc::new(StubUpstream));
        let ctx = ctx_with_token(Some("tok"));
        let result = registry.read("reddit://about", &ctx).await.unwrap();
        assert_eq!(result.text, "test_user");
    }

    #[test]
    fn post_summary_prompt_references_about_resource() {
        let registry = RedditPromptRegistry;
        let prompt = registry.get_prompt("post_summary").unwrap();
        assert_eq!(prompt.resource_refs.get("account").unwrap(), "reddit://about");
    }
}
