//! Authentication strategy adapters.
//!
//! Services authentication happens after registration completes, by
//! sending ordinary protocol lines. The strategy is swappable at runtime;
//! a change takes effect on the next (re)connect.

/// A services authentication strategy.
pub trait AuthStrategy: Send + Sync {
    /// Lines to send once registration completes.
    fn registration_lines(&self) -> Vec<String>;
}

/// NickServ-style IDENTIFY via private message.
#[derive(Debug, Clone)]
pub struct NickServAuth {
    /// Account name.
    pub account: String,
    /// Account password.
    pub password: String,
    /// Service nick to message. Almost always `NickServ`.
    pub service: String,
}

impl NickServAuth {
    /// Identify to `NickServ` with the given account and password.
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
            service: "NickServ".to_string(),
        }
    }
}

impl AuthStrategy for NickServAuth {
    fn registration_lines(&self) -> Vec<String> {
        vec![format!(
            "PRIVMSG {} :IDENTIFY {} {}",
            self.service, self.account, self.password
        )]
    }
}
