//! HTML fragments for the portal pages.
//!
//! Presentation only: every function takes plain data and returns markup,
//! so the route handlers stay testable without string surgery. The pages
//! stay small; they get served over a fresh AP association to a phone
//! that may re-request them several times.

use crate::params::{CustomParameter, LabelPlacement};

/// Shared stylesheet. One phone-width column, full-width inputs.
const STYLE: &str = "<style>body{font-family:sans-serif;margin:2em auto;max-width:24em;\
padding:0 1em}input,button{width:100%;padding:.6em;margin:.3em 0;box-sizing:border-box}\
button{cursor:pointer}a{color:#06c}div.net{padding:.2em 0}span.q{float:right;color:#555}\
dt{font-weight:bold}dd{margin:0 0 .6em 0}</style>";

/// Click-to-fill: copies a scanned SSID into the form and focuses the
/// passphrase field.
const SCRIPT: &str = "<script>function c(l){document.getElementById('s').value=\
l.innerText||l.textContent;document.getElementById('p').focus();}</script>";

/// Wrap a body in the shared page shell.
pub(crate) fn page(title: &str, custom_head: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"/>\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"/>\
         <title>{}</title>{STYLE}{SCRIPT}{custom_head}</head>\
         <body><h1>{}</h1>{body}</body></html>",
        escape(title),
        escape(title),
    )
}

/// Minimal HTML escaping for text interpolated into markup.
pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Root menu options.
pub(crate) fn menu() -> &'static str {
    "<form action=\"/wifi\" method=\"get\"><button>Configure WiFi</button></form>\
     <form action=\"/0wifi\" method=\"get\"><button>Configure WiFi (no scan)</button></form>\
     <form action=\"/i\" method=\"get\"><button>Info</button></form>\
     <form action=\"/exit\" method=\"get\"><button>Exit portal</button></form>\
     <form action=\"/r\" method=\"get\"><button>Restart device</button></form>"
}

/// One scanned network: click-to-fill name, quality on the right, a lock
/// marker on secured networks.
pub(crate) fn network_item(ssid: &str, quality: u8, secured: bool) -> String {
    let lock = if secured { " &#128274;" } else { "" };
    format!(
        "<div class=\"net\"><a href=\"#p\" onclick=\"c(this)\">{}</a>\
         <span class=\"q\">{quality}%{lock}</span></div>",
        escape(ssid),
    )
}

pub(crate) fn no_networks() -> &'static str {
    "<p>No networks found. <a href=\"/wifi\">Scan again</a>.</p>"
}

/// Credential form; `ssid_prefill` comes from the stored credentials.
pub(crate) fn form_open(ssid_prefill: &str) -> String {
    format!(
        "<form method=\"post\" action=\"/wifisave\">\
         <input id=\"s\" name=\"s\" maxlength=\"32\" placeholder=\"SSID\" value=\"{}\"/>\
         <input id=\"p\" name=\"p\" maxlength=\"64\" type=\"password\" placeholder=\"passphrase\"/>",
        escape(ssid_prefill),
    )
}

/// One static-addressing field (ip/gw/sn).
pub(crate) fn static_field(name: &str, placeholder: &str, value: &str) -> String {
    format!(
        "<input id=\"{name}\" name=\"{name}\" maxlength=\"15\" placeholder=\"{}\" value=\"{}\"/>",
        escape(placeholder),
        escape(value),
    )
}

/// A registered custom parameter: label per its placement, then the input,
/// then any auxiliary markup. Markup-only parameters contribute just their
/// markup, unescaped on purpose.
pub(crate) fn param_field(param: &CustomParameter) -> String {
    if !param.is_field() {
        return param.markup().to_string();
    }
    let label = format!(
        "<label for=\"{}\">{}</label>",
        param.id(),
        escape(param.placeholder()),
    );
    let input = format!(
        "<input id=\"{id}\" name=\"{id}\" maxlength=\"{}\" placeholder=\"{}\" value=\"{}\"/>",
        param.capacity(),
        escape(param.placeholder()),
        escape(param.value()),
        id = param.id(),
    );
    match param.placement() {
        LabelPlacement::Before => format!("{label}{input}{}", param.markup()),
        LabelPlacement::After => format!("{input}{label}{}", param.markup()),
        LabelPlacement::None => format!("{input}{}", param.markup()),
    }
}

pub(crate) fn form_close() -> &'static str {
    "<button type=\"submit\">Save</button></form>"
}

pub(crate) fn scan_link() -> &'static str {
    "<p><a href=\"/wifi\">Scan for networks</a></p>"
}

pub(crate) fn back_link() -> &'static str {
    "<p><a href=\"/\">Back</a></p>"
}

pub(crate) fn saved_body() -> &'static str {
    "<p>Credentials saved.</p>\
     <p>The device is now trying to join the network. If it fails, reconnect \
     to the setup network and try again.</p>"
}

pub(crate) fn exit_body() -> &'static str {
    "<p>Closing the portal.</p>"
}

pub(crate) fn reset_body() -> &'static str {
    "<p>Restart requested. The device is going away; reconnect to the setup \
     network if it comes back unprovisioned.</p>"
}

pub(crate) fn erase_body(erased: bool) -> &'static str {
    if erased {
        "<p>Stored credentials erased.</p>"
    } else {
        "<p>Erase failed; stored credentials may still be present.</p>"
    }
}

/// `<dt>/<dd>` pair for the info page.
pub(crate) fn info_entry(term: &str, detail: &str) -> String {
    format!("<dt>{}</dt><dd>{}</dd>", escape(term), escape(detail))
}

pub(crate) fn erase_button() -> &'static str {
    "<form action=\"/erase\" method=\"post\"><button>Erase stored credentials</button></form>"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CustomParameter;

    // ==================== Escaping Tests ====================

    #[test]
    fn test_escape_covers_markup_characters() {
        assert_eq!(
            escape("<b>\"a&b\"</b>'"),
            "&lt;b&gt;&quot;a&amp;b&quot;&lt;/b&gt;&#39;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_ssid_with_markup_is_neutralized() {
        let item = network_item("<script>x</script>", 50, false);
        assert!(!item.contains("<script>x"));
        assert!(item.contains("&lt;script&gt;"));
    }

    // ==================== Page Shell Tests ====================

    #[test]
    fn test_page_includes_custom_head() {
        let html = page("Setup", "<meta name=\"robots\" content=\"none\"/>", "<p>hi</p>");
        assert!(html.contains("<meta name=\"robots\""));
        assert!(html.contains("<title>Setup</title>"));
        assert!(html.contains("<p>hi</p>"));
    }

    // ==================== Form Fragment Tests ====================

    #[test]
    fn test_network_item_marks_secured() {
        assert!(network_item("home", 82, true).contains("&#128274;"));
        assert!(!network_item("open", 40, false).contains("&#128274;"));
        assert!(network_item("home", 82, true).contains("82%"));
    }

    #[test]
    fn test_param_field_label_placement() {
        let before = CustomParameter::new("srv", "Server", "mqtt.local", 32).unwrap();
        let html = param_field(&before);
        let label_at = html.find("<label").unwrap();
        let input_at = html.find("<input").unwrap();
        assert!(label_at < input_at);
        assert!(html.contains("value=\"mqtt.local\""));

        let markup = CustomParameter::markup_only("<hr/>");
        assert_eq!(param_field(&markup), "<hr/>");
    }

    #[test]
    fn test_form_prefills_stored_ssid() {
        assert!(form_open("home").contains("value=\"home\""));
    }
}
