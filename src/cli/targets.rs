//! Picks the browser tab a turn runs in.

use cdp_adapter::TargetInfo;
use turn_flow::{ConversationId, TurnTarget};

const CHAT_ORIGIN: &str = "https://chatgpt.com";

fn is_chat_page(url: &str) -> bool {
    url.starts_with(CHAT_ORIGIN)
}

/// Order of preference:
/// 1. a tab on the target conversation,
/// 2. a chat tab not on any conversation, then any chat tab (the route guard navigates it),
/// 3. a tab whose URL equals the target URL.
pub fn find_target_tab<'a>(targets: &'a [TargetInfo], target: &TurnTarget) -> Option<&'a TargetInfo> {
    let pages: Vec<&TargetInfo> = targets
        .iter()
        .filter(|t| t.is_page() && t.web_socket_debugger_url.is_some())
        .collect();

    if let Some(expected) = target.conversation() {
        if let Some(tab) = pages
            .iter()
            .find(|t| ConversationId::from_url(&t.url).as_ref() == Some(expected))
            .copied()
        {
            return Some(tab);
        }
    }

    if is_chat_page(target.url()) {
        let fresh = pages
            .iter()
            .find(|t| is_chat_page(&t.url) && ConversationId::from_url(&t.url).is_none())
            .copied();
        let any_chat = pages.iter().find(|t| is_chat_page(&t.url)).copied();
        if let Some(tab) = fresh.or(any_chat) {
            return Some(tab);
        }
    }

    pages.into_iter().find(|t| t.url == target.url())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: &str, url: &str) -> TargetInfo {
        TargetInfo {
            id: id.into(),
            kind: "page".into(),
            title: String::new(),
            url: url.into(),
            web_socket_debugger_url: Some(format!("ws://127.0.0.1:9222/devtools/page/{id}")),
        }
    }

    #[test]
    fn conversation_id_wins() {
        let tabs = vec![
            tab("A", "https://chatgpt.com/"),
            tab("B", "https://chatgpt.com/c/0123456789abcdef0123?model=x"),
        ];
        let target = TurnTarget::new("https://chatgpt.com/c/0123456789abcdef0123");
        assert_eq!(find_target_tab(&tabs, &target).unwrap().id, "B");
    }

    #[test]
    fn fresh_chat_prefers_tab_without_conversation() {
        let tabs = vec![
            tab("A", "https://chatgpt.com/c/0123456789abcdef0123"),
            tab("B", "https://chatgpt.com/?model=auto"),
        ];
        let target = TurnTarget::new("https://chatgpt.com/");
        assert_eq!(find_target_tab(&tabs, &target).unwrap().id, "B");

        let only_conversation = vec![tab("A", "https://chatgpt.com/c/0123456789abcdef0123")];
        assert_eq!(find_target_tab(&only_conversation, &target).unwrap().id, "A");
    }

    #[test]
    fn non_chat_url_needs_exact_match() {
        let tabs = vec![tab("A", "https://example.com/chat"), tab("B", "https://chatgpt.com/")];
        let target = TurnTarget::new("https://example.com/chat");
        assert_eq!(find_target_tab(&tabs, &target).unwrap().id, "A");
        assert!(find_target_tab(&tabs, &TurnTarget::new("https://example.com/other")).is_none());
    }

    #[test]
    fn tabs_without_socket_are_skipped() {
        let mut detached = tab("A", "https://chatgpt.com/");
        detached.web_socket_debugger_url = None;
        let mut worker = tab("W", "https://chatgpt.com/");
        worker.kind = "service_worker".into();
        let target = TurnTarget::new("https://chatgpt.com/");
        assert!(find_target_tab(&[detached, worker], &target).is_none());
    }
}
