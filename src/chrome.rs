//! Engine-owned page chrome: the global stylesheet and the login prompt
//!
//! Callers insert and remove these under a suppression permit; the mutation
//! guard also treats both ids as engine-owned.

use crate::dialog::DIALOG_CLASS;
use crate::dom::{Document, NodeId};
use crate::highlight::HIGHLIGHT_CLASS;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub const STYLE_ELEMENT_ID: &str = "lingomarker-global-styles";
pub const LOGIN_PROMPT_ID: &str = "lingomarker-login-prompt";
pub const LOGIN_LINK_ID: &str = "lingomarker-login-link";

/// Used when the highlight colour is not an `rgba(...)` value
pub const FALLBACK_HOVER_COLOR: &str = "rgba(210, 210, 10, 0.6)";

static RGBA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba\(\s*([\d.]+)\s*,\s*([\d.]+)\s*,\s*([\d.]+)\s*,\s*([\d.]+)\s*\)$")
        .expect("Valid rgba regex")
});

/// Hover variant of a highlight colour: alpha raised by 0.2, capped at 1
pub fn hover_color(base: &str) -> String {
    let Some(caps) = RGBA.captures(base.trim()) else {
        return FALLBACK_HOVER_COLOR.to_string();
    };
    let Ok(alpha) = caps[4].parse::<f64>() else {
        return FALLBACK_HOVER_COLOR.to_string();
    };
    let alpha = ((alpha + 0.2).min(1.0) * 100.0).round() / 100.0;
    format!("rgba({}, {}, {}, {})", &caps[1], &caps[2], &caps[3], alpha)
}

/// Stylesheet for highlights, their hover state and the dialog
pub fn stylesheet(highlight_color: &str) -> String {
    format!(
        ":root {{ --lingomarker-highlight-bg: {color}; --lingomarker-highlight-bg-hover: {hover}; }}\n\
         .{hl} {{ background-color: var(--lingomarker-highlight-bg) !important; cursor: pointer; \
         transition: background-color 0.2s; text-decoration: none; padding-bottom: 1px; \
         border-bottom: 1px dotted currentColor; }}\n\
         .{hl}:hover {{ background-color: var(--lingomarker-highlight-bg-hover) !important; }}\n\
         .{dialog} {{ background-color: rgb(208, 180, 111); border: 1px solid #aaa; border-radius: 4px; \
         box-shadow: 0 1px 4px rgba(0,0,0,0.2); font-size: 14px; padding: 8px 5px; text-align: center; }}\n\
         #{prompt} {{ position: fixed; bottom: 10px; right: 10px; z-index: 2147483647; }}",
        color = highlight_color,
        hover = hover_color(highlight_color),
        hl = HIGHLIGHT_CLASS,
        dialog = DIALOG_CLASS,
        prompt = LOGIN_PROMPT_ID,
    )
}

/// Insert the style element into `<head>`, or refresh its rules
pub fn install_styles(doc: &mut Document, highlight_color: &str) -> NodeId {
    let css = stylesheet(highlight_color);
    let style = match doc.element_by_id(STYLE_ELEMENT_ID) {
        Some(existing) => existing,
        None => {
            let style = doc.create_element("style");
            doc.set_attr(style, "id", STYLE_ELEMENT_ID);
            let head = doc.head();
            doc.append_child(head, style);
            style
        }
    };
    doc.set_text_content(style, &css);
    debug!("Installed styles with highlight colour {}", highlight_color);
    style
}

/// Show the login affordance once; no-op if already present
pub fn show_login_prompt(doc: &mut Document, backend_base: &str) -> NodeId {
    if let Some(existing) = doc.element_by_id(LOGIN_PROMPT_ID) {
        return existing;
    }
    let prompt = doc.create_element("div");
    doc.set_attr(prompt, "id", LOGIN_PROMPT_ID);
    doc.append_text(prompt, "LingoMarker: Please ");
    let link = doc.create_element("a");
    doc.set_attr(link, "id", LOGIN_LINK_ID);
    doc.set_attr(link, "href", format!("{}/login", backend_base));
    doc.append_text(link, "log in");
    doc.append_child(prompt, link);
    doc.append_text(prompt, " to save words.");

    let body = doc.body();
    doc.append_child(body, prompt);
    debug!("Login prompt shown");
    prompt
}

pub fn hide_login_prompt(doc: &mut Document) -> bool {
    match doc.element_by_id(LOGIN_PROMPT_ID) {
        Some(prompt) => {
            doc.remove(prompt);
            true
        }
        None => false,
    }
}
