//! Custom Tera filters emulating the storefront asset helpers.

use std::collections::HashMap;

use tera::{Result, Value};

/// Assets are copied to the output root, so an asset's URL is its path.
pub(crate) fn asset_url(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    Ok(value.clone())
}

pub(crate) fn stylesheet_tag(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let href = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Err(tera::Error::msg("stylesheet_tag filter expects a string")),
    };
    Ok(Value::String(stylesheet_link(&href)))
}

/// `<link>` element for `href`. The href is inserted verbatim.
pub fn stylesheet_link(href: &str) -> String {
    format!(r#"<link rel="stylesheet" href="{}">"#, href)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(filter: fn(&Value, &HashMap<String, Value>) -> Result<Value>, input: Value) -> Value {
        filter(&input, &HashMap::new()).unwrap()
    }

    #[test]
    fn test_asset_url_is_identity() {
        for input in ["style.css", "", "assets/app.js?v=1", "<weird \"path\">"] {
            assert_eq!(apply(asset_url, json!(input)), json!(input));
        }
        assert_eq!(apply(asset_url, json!(42)), json!(42));
    }

    #[test]
    fn test_stylesheet_tag() {
        assert_eq!(
            apply(stylesheet_tag, json!("style.css")),
            json!(r#"<link rel="stylesheet" href="style.css">"#)
        );
    }

    #[test]
    fn test_stylesheet_tag_does_not_escape() {
        let href = r#"a"b'<c>&d"#;
        assert_eq!(
            apply(stylesheet_tag, json!(href)),
            json!(format!(r#"<link rel="stylesheet" href="{}">"#, href))
        );
        assert_eq!(
            stylesheet_link(href),
            "<link rel=\"stylesheet\" href=\"a\"b'<c>&d\">"
        );
    }

    #[test]
    fn test_stylesheet_tag_rejects_structured_values() {
        assert!(stylesheet_tag(&json!(["a"]), &HashMap::new()).is_err());
        assert!(stylesheet_tag(&Value::Null, &HashMap::new()).is_err());
    }
}
