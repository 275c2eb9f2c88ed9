//! Page-side expressions. Each one is a self-invoking function returning a plain
//! JSON object whose keys match the `chatturn-core-types` records.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// CSS selectors the scripts use to find page elements. Each list is tried in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selectors {
    pub composer: Vec<String>,
    pub submit: Vec<String>,
    pub stop: Vec<String>,
    /// Attribute carrying `user` / `assistant` on rendered turns.
    pub role_attribute: String,
}

impl Default for Selectors {
    fn default() -> Self {
        let list = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            composer: list(&[
                r#"#prompt-textarea[contenteditable="true"]"#,
                "#prompt-textarea",
                r#"[contenteditable="true"].ProseMirror"#,
            ]),
            submit: list(&[
                r#"button[data-testid="send-button"]"#,
                r#"button[aria-label="Send prompt"]"#,
                r#"button[aria-label*="Send"]"#,
                r#"button[type="submit"]"#,
            ]),
            stop: list(&[
                r#"button[data-testid="stop-button"]"#,
                r#"button[aria-label*="Stop"]"#,
            ]),
            role_attribute: "data-message-author-role".to_string(),
        }
    }
}

const PRELUDE: &str = r#"
  const first = (list, root) => {
    for (const s of list) {
      try {
        const el = (root || document).querySelector(s);
        if (el) return el;
      } catch (e) {}
    }
    return null;
  };
  const text = (el) => (el ? (el.innerText || el.textContent || "") : "");
  const composer = () => first(SEL.composer);
  const submitControl = (ed) => first(SEL.submit, ed ? (ed.closest("form") || document) : document);
  const stopControl = () => first(SEL.stop);
  const turns = (role) => Array.from(document.querySelectorAll("[" + SEL.roleAttribute + '="' + role + '"]'));
  const sig = (el) => {
    if (!el) return "";
    const parent = el.parentElement;
    const idx = parent ? Array.from(parent.children).indexOf(el) : -1;
    return [
      el.getAttribute("data-message-id") || "",
      el.getAttribute("data-testid") || "",
      el.getAttribute("id") || "",
      String(idx),
      String((el.textContent || "").length),
    ].join("|");
  };
  const pressEnter = (ed) => {
    for (const type of ["keydown", "keypress", "keyup"]) {
      ed.dispatchEvent(new KeyboardEvent(type, { key: "Enter", code: "Enter", which: 13, keyCode: 13, bubbles: true }));
    }
  };
"#;

fn wrap(selectors: &Selectors, locals: &str, body: &str) -> String {
    let encoded = serde_json::to_string(selectors).unwrap_or_else(|_| "{}".to_string());
    format!("(() => {{\n  const SEL = {encoded};\n{locals}{PRELUDE}{body}\n}})()")
}

pub fn read_state(selectors: &Selectors) -> String {
    wrap(
        selectors,
        "",
        r#"
  const users = turns("user");
  const assistants = turns("assistant");
  const lastUser = users.length ? users[users.length - 1] : null;
  const lastAssistant = assistants.length ? assistants[assistants.length - 1] : null;
  let after = false;
  if (lastUser && lastAssistant) {
    after = !!(lastUser.compareDocumentPosition(lastAssistant) & Node.DOCUMENT_POSITION_FOLLOWING);
  }
  return {
    url: location.href,
    userTurnCount: users.length,
    assistantTurnCount: assistants.length,
    lastUserText: text(lastUser),
    lastUserSignature: sig(lastUser),
    lastAssistantText: text(lastAssistant),
    lastAssistantSignature: sig(lastAssistant),
    assistantAfterLastUser: after,
    generationIndicatorVisible: !!stopControl(),
  };"#,
    )
}

pub fn send_readiness(selectors: &Selectors) -> String {
    wrap(
        selectors,
        "",
        r#"
  const ed = composer();
  return {
    hasComposer: !!ed,
    hasSubmitControl: !!submitControl(ed),
    indicatorVisible: !!stopControl(),
  };"#,
    )
}

pub fn submit_prompt(selectors: &Selectors, prompt: &str) -> String {
    let locals = format!("  const PROMPT = {};\n", json!(prompt));
    wrap(
        selectors,
        &locals,
        r#"
  const ed = composer();
  if (!ed) return { accepted: false, error: "composer not found" };
  try {
    ed.focus();
    const range = document.createRange();
    range.selectNodeContents(ed);
    const selection = window.getSelection();
    selection.removeAllRanges();
    selection.addRange(range);
    document.execCommand("insertText", false, PROMPT);
  } catch (e) {
    ed.textContent = PROMPT;
    ed.dispatchEvent(new Event("input", { bubbles: true }));
  }
  if (!(ed.innerText || ed.textContent || "").trim()) {
    return { accepted: false, error: "prompt text was not inserted" };
  }
  const btn = submitControl(ed);
  if (btn) {
    if (btn.disabled) return { accepted: false, method: "click", error: "submit control disabled" };
    btn.click();
    return { accepted: true, method: "click" };
  }
  try {
    ed.focus();
    pressEnter(ed);
    return { accepted: true, method: "enter" };
  } catch (e) {
    return { accepted: false, error: "submit control not found" };
  }"#,
    )
}

pub fn press_submit_key(selectors: &Selectors) -> String {
    wrap(
        selectors,
        "",
        r#"
  const ed = composer();
  if (!ed) return { accepted: false, error: "composer not found" };
  try {
    ed.focus();
    pressEnter(ed);
    return { accepted: true };
  } catch (e) {
    return { accepted: false, error: String(e) };
  }"#,
    )
}

pub fn focus_composer(selectors: &Selectors) -> String {
    wrap(
        selectors,
        "",
        r#"
  const ed = composer();
  if (!ed) return { ok: false };
  try { ed.scrollIntoView({ block: "center", inline: "nearest" }); } catch (e) {}
  try {
    ed.focus();
    const range = document.createRange();
    range.selectNodeContents(ed);
    range.collapse(false);
    const selection = window.getSelection();
    selection.removeAllRanges();
    selection.addRange(range);
  } catch (e) {}
  return { ok: true };"#,
    )
}

pub fn click_stop_control(selectors: &Selectors) -> String {
    wrap(
        selectors,
        "",
        r#"
  const stop = stopControl();
  if (!stop) return { hadControl: false, clicked: false, ok: false };
  try { stop.scrollIntoView({ block: "center", inline: "nearest" }); } catch (e) {}
  try {
    stop.click();
    return { hadControl: true, clicked: true, ok: true };
  } catch (e) {
    return { hadControl: true, clicked: false, ok: false };
  }"#,
    )
}

pub fn composer_present(selectors: &Selectors) -> String {
    wrap(selectors, "", "\n  return !!composer();")
}

pub const READY_STATE: &str = "document.readyState";

pub fn read_transcript(selectors: &Selectors, limit: usize) -> String {
    let locals = format!("  const LIMIT = {limit};\n");
    wrap(
        selectors,
        &locals,
        r#"
  const all = Array.from(document.querySelectorAll("[" + SEL.roleAttribute + "]"))
    .map((el) => {
      const role = (el.getAttribute(SEL.roleAttribute) || "").trim();
      if (role !== "user" && role !== "assistant") return null;
      return { role: role, text: text(el), signature: sig(el) };
    })
    .filter(Boolean);
  return LIMIT > 0 ? all.slice(-LIMIT) : all;"#,
    )
}
