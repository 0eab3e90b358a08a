//! Routing after a model turn.
//!
//! Decides where the orchestrator goes once the model has answered:
//! - tool calls present → execute them
//! - text present and the conversation carries design source → synthesize
//! - otherwise → done (a plain conversational reply)
//!
//! Synthesis publishes to a live store, so it needs intent from the user: a
//! URL in a user message, or a user message asking for a theme. Tool results
//! and assistant text alone never qualify.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::inference::types::Role;

use super::conversation::ConversationState;

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bhttps?://\S+").expect("valid regex"));

static RE_THEME_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(generate|create|build|make|convert|design)\b.{0,60}\b(theme|storefront|shopify)\b")
        .expect("valid regex")
});

/// Next node after `AwaitingModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Tools,
    Synthesize,
    Done,
}

/// Route on the latest message, which must be the model's reply.
pub fn route_after_model(state: &ConversationState) -> Route {
    let Some(latest) = state.last().filter(|m| m.role == Role::Assistant) else {
        return Route::Done;
    };

    if latest.has_tool_calls() {
        return Route::Tools;
    }

    if latest.has_text() && has_design_source(state) {
        return Route::Synthesize;
    }

    Route::Done
}

/// Whether the user pointed at a design or asked for a theme.
pub fn has_design_source(state: &ConversationState) -> bool {
    state
        .messages()
        .iter()
        .filter(|m| m.role == Role::User)
        .any(|m| RE_URL.is_match(&m.content) || RE_THEME_DIRECTIVE.is_match(&m.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::Message;
    use crate::inference::types::ToolCall;

    fn with_reply(opening: &str, reply: Message) -> ConversationState {
        let mut state = ConversationState::new(opening);
        state.push(reply);
        state
    }

    #[test]
    fn test_tool_calls_route_to_tools() {
        let call = ToolCall {
            id: "c1".into(),
            name: "get_code".into(),
            arguments: serde_json::json!({}),
        };
        // Text alongside tool calls still routes to tools.
        let state = with_reply("hi", Message::assistant_with_tools("fetching", vec![call]));
        assert_eq!(route_after_model(&state), Route::Tools);
    }

    #[test]
    fn test_directive_routes_to_synthesis() {
        let state = with_reply(
            "Generate a theme for a minimal blog",
            Message::assistant(r#"{"assets/style.css": "body{}"}"#),
        );
        assert_eq!(route_after_model(&state), Route::Synthesize);
    }

    #[test]
    fn test_figma_url_routes_to_synthesis() {
        let state = with_reply(
            "Here is my file https://www.figma.com/design/abc123/Shop?node-id=1-2",
            Message::assistant("<div class='hero'>...</div>"),
        );
        assert_eq!(route_after_model(&state), Route::Synthesize);
    }

    #[test]
    fn test_tool_result_alone_is_not_source() {
        let mut state = ConversationState::new("what tools do you have?");
        state.push(Message::tool_result("c1", "<div/>"));
        state.push(Message::assistant("const Hero = () => <div/>;"));
        assert_eq!(route_after_model(&state), Route::Done);

        let mut state = ConversationState::new("Build a Shopify theme from the selected frame");
        state.push(Message::tool_result("c1", "<div/>"));
        state.push(Message::assistant("const Hero = () => <div/>;"));
        assert_eq!(route_after_model(&state), Route::Synthesize);
    }

    #[test]
    fn test_assistant_url_is_not_source() {
        let state = with_reply(
            "hello there",
            Message::assistant("See https://shopify.dev/docs/themes for details."),
        );
        assert_eq!(route_after_model(&state), Route::Done);
    }

    #[test]
    fn test_small_talk_routes_to_done() {
        let state = with_reply("hello there", Message::assistant("Hi! How can I help?"));
        assert_eq!(route_after_model(&state), Route::Done);
    }

    #[test]
    fn test_blank_reply_routes_to_done() {
        let state = with_reply("Generate a theme for a blog", Message::assistant("   "));
        assert_eq!(route_after_model(&state), Route::Done);
    }

    #[test]
    fn test_no_reply_routes_to_done() {
        let state = ConversationState::new("Generate a theme for a blog");
        assert_eq!(route_after_model(&state), Route::Done);
    }
}
