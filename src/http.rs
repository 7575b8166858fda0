//! Shared HTTP helpers for the GitHub and Copilot endpoints.

use reqwest::RequestBuilder;

/// Editor identification the Copilot endpoints require.
const EDITOR_VERSION: &str = "vscode/1.95.0";
const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.22.4";
const INTEGRATION_ID: &str = "vscode-chat";

/// Maximum length for error body content in error messages.
const MAX_ERROR_BODY_LEN: usize = 200;

/// Attach the editor headers the Copilot endpoints expect.
pub fn with_editor_headers(builder: RequestBuilder) -> RequestBuilder {
    builder
        .header("Editor-Version", EDITOR_VERSION)
        .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
        .header("Copilot-Integration-Id", INTEGRATION_ID)
}

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
pub fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "access_token",
        "refresh_token",
        "secret",
        "password",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
        "tid=",
    ];

    let truncated = if body.chars().count() > MAX_ERROR_BODY_LEN {
        let head: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }

    truncated
}
