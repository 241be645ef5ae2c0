use super::pkce::CODE_CHALLENGE_METHOD;

/// Client configuration needed to send a browser to the provider's consent page.
#[derive(Debug, Clone)]
pub struct Authorizer {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl Authorizer {
    /// Build the provider authorize URL for one login attempt.
    ///
    /// Pure: the same `(state, challenge)` against the same configuration
    /// always yields the same string.
    pub fn build_auth_url(&self, state: &str, code_challenge: &str) -> String {
        let scope = self.scopes.join(" ");
        let params = [
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", CODE_CHALLENGE_METHOD),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.authorize_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.authorize_url)
    }
}
