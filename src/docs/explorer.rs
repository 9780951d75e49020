//! Interactive explorer page (swagger-ui) with the generated spec inlined.

use crate::docs::postprocess::API_KEY_SCHEME;
use crate::utils::serde_helpers::script_safe_json;
use serde::Serialize;

const SWAGGER_UI_DIST: &str = "https://unpkg.com/swagger-ui-dist@5";
const CUSTOM_CSS: &str = ".opblock-description { white-space: pre-line }";

/// Render the explorer. `preauth_key` embeds the key into the page, so anyone
/// able to load it can invoke operations.
pub fn explorer_html<T: Serialize>(title: &str, spec: &T, preauth_key: Option<&str>) -> serde_json::Result<String> {
    let spec_json = script_safe_json(spec)?;
    let preauth = match preauth_key {
        Some(key) => format!(
            "ui.preauthorizeApiKey({}, {});",
            script_safe_json(&API_KEY_SCHEME)?,
            script_safe_json(&key)?
        ),
        None => String::new(),
    };
    Ok(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title}</title>
  <link rel="stylesheet" href="{dist}/swagger-ui.css" />
  <style>{css}</style>
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="{dist}/swagger-ui-bundle.js"></script>
  <script>
    window.onload = function () {{
      const ui = SwaggerUIBundle({{
        spec: {spec},
        dom_id: "#swagger-ui",
        deepLinking: true,
        persistAuthorization: true
      }});
      {preauth}
      window.ui = ui;
    }};
  </script>
</body>
</html>
"##,
        title = html_escape(title),
        dist = SWAGGER_UI_DIST,
        css = CUSTOM_CSS,
        spec = spec_json,
        preauth = preauth,
    ))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
