use crate::{AppId, AppIdRef, AppSecret, AppSecretRef};

/// The namespace prepended to cache and lock keys unless overridden
pub const DEFAULT_NAMESPACE: &str = "tessera";

/// One identity whose token is managed
///
/// The tenant is the unit of keying: every tenant gets its own cache entry,
/// its own distributed lock and, within a process, its own
/// [`TokenManager`](crate::TokenManager).
#[derive(Clone, Debug)]
pub struct Tenant {
    app_id: AppId,
    app_secret: AppSecret,
    namespace: String,
}

impl Tenant {
    /// Constructs a tenant using the default key namespace
    pub fn new(app_id: AppId, app_secret: AppSecret) -> Self {
        Self {
            app_id,
            app_secret,
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }

    /// Replaces the namespace used to prefix this tenant's keys
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The application identifier
    #[inline]
    pub fn app_id(&self) -> &AppIdRef {
        &self.app_id
    }

    /// The application secret
    #[inline]
    pub fn app_secret(&self) -> &AppSecretRef {
        &self.app_secret
    }

    /// The namespace prefixing this tenant's keys
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The key under which this tenant's token is cached
    pub fn cache_key(&self) -> String {
        format!("{}:token:{}", self.namespace, self.app_id)
    }

    /// The key under which this tenant's refresh lock is held
    pub fn lock_key(&self) -> String {
        format!("{}:token_lock:{}", self.namespace, self.app_id)
    }
}
