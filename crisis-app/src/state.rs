use crisis_core::CrisisBackend;

/// Backend plus who is asking. Commands never reach for globals.
pub struct AppState<B> {
    pub backend: B,
    pub signed_in: bool,
    pub user_role: Option<String>,
    pub crisis_id: Option<String>,
}

impl<B: CrisisBackend> AppState<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            signed_in: false,
            user_role: None,
            crisis_id: None,
        }
    }

    /// Marks the caller as signed in. A user without a role in their
    /// metadata counts as the crisis manager.
    pub fn signed_in_as(mut self, role: Option<String>) -> Self {
        self.signed_in = true;
        self.user_role = role;
        self
    }

    pub fn with_crisis(mut self, crisis_id: Option<String>) -> Self {
        self.crisis_id = crisis_id;
        self
    }

    pub fn crisis(&self) -> Option<&str> {
        self.crisis_id.as_deref()
    }
}
