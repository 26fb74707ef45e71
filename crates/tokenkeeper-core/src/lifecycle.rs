//! Token lifecycle engine.
//!
//! [`TokenLifecycle`] owns the auth state for one mounted instance. It wires
//! the persisted [`StateStore`] to the expiration timers, the token-change
//! notifier and the caller-supplied sign-in/renew/sign-out callbacks.
//!
//! Phases are never stored; they are derived from the current snapshot and
//! the clock. After every committed change that touches the auth or renew
//! bundle, the timers are re-armed and a reconciliation pass runs.

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokenkeeper_storage::{StorageBackends, StorageScope};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::codec::coerce_expiration;
use crate::notify::TokenChangeFn;
use crate::{
    ActionResult, AuthPhase, AuthState, Clock, ExpirationTimer, LifecycleConfig, LifecycleError,
    LifecycleResult, SingleFlight, StateStore, SubscriberId, SystemClock, TokenBundle,
    TokenNotifier, UserProfile,
};

type ActionFuture<U> = BoxFuture<'static, anyhow::Result<ActionResult<U>>>;
type SignInFn<U, I> = Arc<dyn Fn(AuthState<U>, I) -> ActionFuture<U> + Send + Sync>;
type RenewFn<U, I> = Arc<dyn Fn(AuthState<U>, Option<I>) -> ActionFuture<U> + Send + Sync>;
type SignOutFn<U, I> =
    Arc<dyn Fn(AuthState<U>, Option<I>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Operations guarded by single-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignIn,
    Renew,
    SignOut,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SignIn => "sign_in",
            Operation::Renew => "renew",
            Operation::SignOut => "sign_out",
        }
    }
}

struct Handlers<U, I> {
    sign_in: Option<SignInFn<U, I>>,
    renew: Option<RenewFn<U, I>>,
    sign_out: Option<SignOutFn<U, I>>,
}

/// Builder for [`TokenLifecycle`].
///
/// ```ignore
/// let lifecycle = TokenLifecycle::<User, Credentials>::builder()
///     .sign_in(|_state, creds| async move { api.login(creds).await })
///     .renew(|state, _| async move { api.refresh(state.renew).await })
///     .on_token_change(|_state, token| http.set_bearer(token))
///     .mount()
///     .await?;
/// ```
pub struct LifecycleBuilder<U, I> {
    config: LifecycleConfig<U>,
    backends: Option<StorageBackends>,
    clock: Arc<dyn Clock>,
    handlers: Handlers<U, I>,
    on_token_change: Option<TokenChangeFn<U>>,
}

impl<U, I> LifecycleBuilder<U, I>
where
    U: UserProfile,
    I: Send + 'static,
{
    fn new() -> Self {
        Self {
            config: LifecycleConfig::default(),
            backends: None,
            clock: Arc::new(SystemClock),
            handlers: Handlers {
                sign_in: None,
                renew: None,
                sign_out: None,
            },
            on_token_change: None,
        }
    }

    pub fn config(mut self, config: LifecycleConfig<U>) -> Self {
        self.config = config;
        self
    }

    /// Storage backends for both retention scopes. Defaults to in-memory.
    pub fn storage(mut self, backends: StorageBackends) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Callback exchanging caller input for credentials.
    pub fn sign_in<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AuthState<U>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ActionResult<U>>> + Send + 'static,
    {
        let handler: SignInFn<U, I> = Arc::new(move |state, input| f(state, input).boxed());
        self.handlers.sign_in = Some(handler);
        self
    }

    /// Callback obtaining a fresh auth token, usually from the renew token.
    pub fn renew<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AuthState<U>, Option<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ActionResult<U>>> + Send + 'static,
    {
        let handler: RenewFn<U, I> = Arc::new(move |state, input| f(state, input).boxed());
        self.handlers.renew = Some(handler);
        self
    }

    /// Callback notifying the remote side of a sign-out. Its outcome never
    /// prevents the local state from being cleared.
    pub fn sign_out<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AuthState<U>, Option<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: SignOutFn<U, I> = Arc::new(move |state, input| f(state, input).boxed());
        self.handlers.sign_out = Some(handler);
        self
    }

    /// Called once per distinct auth token value, including when it is
    /// cleared.
    ///
    /// The callback runs synchronously inside the commit. Sinks that need to
    /// await should hand the token to `tokio::spawn` or a channel.
    pub fn on_token_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&AuthState<U>, Option<&str>) + Send + Sync + 'static,
    {
        self.on_token_change = Some(Arc::new(f));
        self
    }

    /// Load persisted state, deliver the initial token notification, arm the
    /// timers and run the first reconciliation pass.
    ///
    /// When this returns the engine is initialized.
    pub async fn mount(self) -> LifecycleResult<TokenLifecycle<U, I>> {
        let runtime =
            Handle::try_current().map_err(|err| LifecycleError::Runtime(err.to_string()))?;
        let backends = self.backends.unwrap_or_else(StorageBackends::in_memory);
        let scope = self.config.storage_scope;
        let key = self.config.storage_key();
        let store = StateStore::load(backends.resolve(scope), key.clone());

        info!(
            key = %key,
            scope = %scope,
            development = self.config.is_development(),
            "Mounting token lifecycle"
        );

        let inner = Arc::new(Inner {
            config: self.config,
            backends,
            scope: Mutex::new(scope),
            store,
            clock: self.clock,
            runtime,
            handlers: self.handlers,
            actions: SingleFlight::new(),
            sign_outs: SingleFlight::new(),
            auth_timer: ExpirationTimer::new("auth"),
            renew_timer: ExpirationTimer::new("renew"),
            notifier: TokenNotifier::new(self.on_token_change),
            watched: Mutex::new((None, None)),
            disposed: AtomicBool::new(false),
            subscription: Mutex::new(None),
        });

        if inner.config.development_signed_in && inner.store.get().auth.is_none() {
            if let Some(result) = inner.development_result() {
                debug!("Starting signed in with the development token");
                inner.apply_result(&result)?;
            }
        }

        let state = inner.store.get();
        inner.notifier.prime(&state, inner.clock.now());
        *inner.watched.lock() = (state.auth.clone(), state.renew.clone());
        inner.arm_timers(&state);

        let weak = Arc::downgrade(&inner);
        let id = inner.store.subscribe(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change(state);
            }
        });
        *inner.subscription.lock() = Some(id);

        inner.clone().reconcile(true).await;

        Ok(TokenLifecycle { inner })
    }
}

/// Handle to a mounted token lifecycle engine. Cheap to clone.
pub struct TokenLifecycle<U, I> {
    inner: Arc<Inner<U, I>>,
}

impl<U, I> Clone for TokenLifecycle<U, I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<U, I> TokenLifecycle<U, I>
where
    U: UserProfile,
    I: Send + 'static,
{
    pub fn builder() -> LifecycleBuilder<U, I> {
        LifecycleBuilder::new()
    }

    /// Sign in with caller input. Concurrent calls share one execution.
    ///
    /// With a development token configured, the sign-in callback is never
    /// invoked and the development token is committed instead.
    pub async fn sign_in(&self, input: I) -> LifecycleResult<ActionResult<U>> {
        self.inner.ensure_live()?;
        let inner = self.inner.clone();
        self.inner
            .actions
            .run(Operation::SignIn, move || inner.perform_sign_in(input))
            .await
    }

    /// Obtain a new auth token through the renew callback. Concurrent calls,
    /// including scheduled renewals, share one execution. A failed renewal
    /// leaves the state untouched.
    pub async fn renew_token(&self, input: Option<I>) -> LifecycleResult<ActionResult<U>> {
        self.inner.ensure_live()?;
        self.inner.renew_token(input).await
    }

    /// Run the sign-out callback, if any, then clear the state. The state is
    /// cleared even if the callback fails.
    pub async fn sign_out(&self, input: Option<I>) -> LifecycleResult<()> {
        self.inner.ensure_live()?;
        let inner = self.inner.clone();
        self.inner
            .sign_outs
            .run(Operation::SignOut, move || inner.perform_sign_out(input))
            .await
    }

    /// Commit an externally obtained result without invoking any callback.
    pub fn set_auth(&self, result: ActionResult<U>) -> LifecycleResult<()> {
        self.inner.ensure_live()?;
        self.inner.apply_result(&result)?;
        info!("Auth state set externally");
        Ok(())
    }

    pub fn state(&self) -> AuthState<U> {
        self.inner.store.get()
    }

    pub fn phase(&self) -> AuthPhase {
        self.state().phase_at(self.inner.clock.now())
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase().is_authenticated()
    }

    /// The auth token if it is currently valid.
    pub fn token(&self) -> Option<String> {
        let now = self.inner.clock.now();
        self.state().token_at(now).map(str::to_string)
    }

    pub fn user(&self) -> Option<U> {
        self.state().user
    }

    /// Observe every committed state change.
    pub fn subscribe<F>(&self, f: F) -> SubscriberId
    where
        F: Fn(&AuthState<U>) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(f)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.store.unsubscribe(id)
    }

    /// True while `operation` has an execution pending.
    pub fn is_pending(&self, operation: Operation) -> bool {
        match operation {
            Operation::SignOut => self.inner.sign_outs.is_in_flight(&operation),
            _ => self.inner.actions.is_in_flight(&operation),
        }
    }

    pub fn storage_key(&self) -> String {
        self.inner.store.storage_key()
    }

    pub fn storage_scope(&self) -> StorageScope {
        *self.inner.scope.lock()
    }

    /// Move persistence to another retention scope. The current state is
    /// written there on the next mutation.
    pub fn set_storage_scope(&self, scope: StorageScope) {
        let mut current = self.inner.scope.lock();
        if *current == scope {
            return;
        }
        self.inner
            .store
            .retarget(self.inner.backends.resolve(scope), self.inner.config.storage_key());
        let previous = std::mem::replace(&mut *current, scope);
        info!(from = %previous, to = %scope, "Switched auth state storage scope");
    }

    /// Instants the auth and renew timers are armed for.
    pub fn armed_expirations(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            self.inner.auth_timer.armed_at(),
            self.inner.renew_timer.armed_at(),
        )
    }

    /// Disarm timers and stop reacting to state changes. Pending operations
    /// settle for their callers but their results are not committed.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_disposed()
    }
}

struct Inner<U, I> {
    config: LifecycleConfig<U>,
    backends: StorageBackends,
    scope: Mutex<StorageScope>,
    store: StateStore<U>,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    handlers: Handlers<U, I>,
    actions: SingleFlight<Operation, LifecycleResult<ActionResult<U>>>,
    sign_outs: SingleFlight<Operation, LifecycleResult<()>>,
    auth_timer: ExpirationTimer,
    renew_timer: ExpirationTimer,
    notifier: TokenNotifier<U>,
    /// (auth, renew) as of the last change the timers were armed for.
    watched: Mutex<(Option<TokenBundle>, Option<TokenBundle>)>,
    disposed: AtomicBool,
    subscription: Mutex<Option<SubscriberId>>,
}

impl<U, I> Inner<U, I>
where
    U: UserProfile,
    I: Send + 'static,
{
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> LifecycleResult<()> {
        if self.is_disposed() {
            return Err(LifecycleError::Disposed);
        }
        Ok(())
    }

    fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.auth_timer.disarm();
        self.renew_timer.disarm();
        if let Some(id) = self.subscription.lock().take() {
            self.store.unsubscribe(id);
        }
        info!("Token lifecycle shut down");
    }

    /// Commit `f(latest)`. Skipped once disposed.
    fn commit<F>(&self, f: F) -> LifecycleResult<bool>
    where
        F: FnOnce(&AuthState<U>) -> AuthState<U>,
    {
        if self.is_disposed() {
            debug!("Discarding state change after shutdown");
            return Ok(false);
        }
        Ok(self.store.update(f)?)
    }

    /// Coerce expirations and merge `result` into the latest state. Absent
    /// or empty renew and absent user fields keep their previous values.
    fn apply_result(&self, result: &ActionResult<U>) -> LifecycleResult<()> {
        let now = self.clock.now();
        let auth = TokenBundle::new(
            result.token.clone(),
            coerce_expiration(result.token_expiration, now)?,
        );
        let renew = match &result.renew {
            Some(token) if !token.is_empty() => Some(TokenBundle::new(
                token.clone(),
                coerce_expiration(result.renew_expiration, now)?,
            )),
            _ => None,
        };

        self.commit(|prev| AuthState {
            initialized: true,
            auth: Some(auth),
            renew: renew.or_else(|| prev.renew.clone()),
            user: result.user.clone().or_else(|| prev.user.clone()),
        })?;
        Ok(())
    }

    fn development_result(&self) -> Option<ActionResult<U>> {
        if !self.config.is_development() {
            return None;
        }
        let token = self.config.development_token.clone()?;
        let mut result = ActionResult::new(token);
        result.user = self.config.development_user.clone();
        Some(result)
    }

    async fn perform_sign_in(self: Arc<Self>, input: I) -> LifecycleResult<ActionResult<U>> {
        if let Some(result) = self.development_result() {
            self.apply_result(&result)?;
            info!("Signed in with the development token");
            return Ok(result);
        }

        let Some(handler) = self.handlers.sign_in.clone() else {
            warn!("Sign-in requested without a sign-in handler");
            return Err(LifecycleError::NoSignInHandler);
        };

        let result = handler(self.store.get(), input).await.map_err(|err| {
            warn!(error = %err, "Sign-in callback failed");
            LifecycleError::SignIn(Arc::new(err))
        })?;

        self.apply_result(&result)?;
        info!(
            has_renew = result.renew.is_some(),
            has_user = result.user.is_some(),
            "Signed in"
        );
        Ok(result)
    }

    async fn renew_token(self: &Arc<Self>, input: Option<I>) -> LifecycleResult<ActionResult<U>> {
        let inner = self.clone();
        self.actions
            .run(Operation::Renew, move || inner.perform_renew(input))
            .await
    }

    async fn perform_renew(self: Arc<Self>, input: Option<I>) -> LifecycleResult<ActionResult<U>> {
        let Some(handler) = self.handlers.renew.clone() else {
            debug!("Renewal requested without a renew handler");
            return Err(LifecycleError::NoRenewHandler);
        };

        let result = handler(self.store.get(), input).await.map_err(|err| {
            warn!(error = %err, "Renew callback failed");
            LifecycleError::Renew(Arc::new(err))
        })?;

        self.apply_result(&result)?;
        info!(has_renew = result.renew.is_some(), "Auth token renewed");
        Ok(result)
    }

    async fn perform_sign_out(self: Arc<Self>, input: Option<I>) -> LifecycleResult<()> {
        if let Some(handler) = self.handlers.sign_out.clone() {
            if let Err(err) = handler(self.store.get(), input).await {
                warn!(error = %err, "Sign-out callback failed, clearing local state anyway");
            }
        }

        self.commit(|_| AuthState::signed_out())?;
        info!("Signed out");
        Ok(())
    }

    /// Store subscriber. Runs synchronously after every committed change.
    fn on_state_change(self: &Arc<Self>, state: &AuthState<U>) {
        if self.is_disposed() {
            return;
        }

        self.notifier.observe(state);

        let changed = {
            let mut watched = self.watched.lock();
            let current = (state.auth.clone(), state.renew.clone());
            if *watched == current {
                false
            } else {
                *watched = current;
                true
            }
        };

        if changed {
            self.arm_timers(state);
            self.runtime.spawn(self.clone().reconcile(false));
        }
    }

    fn arm_timers(self: &Arc<Self>, state: &AuthState<U>) {
        let auth_at = state.auth.as_ref().and_then(|bundle| bundle.expires_at);
        let weak = Arc::downgrade(self);
        self.auth_timer
            .arm(&self.runtime, &self.clock, auth_at, move |at| {
                on_auth_expired(weak, at)
            });

        let renew_at = state.renew.as_ref().and_then(|bundle| bundle.expires_at);
        let weak = Arc::downgrade(self);
        self.renew_timer
            .arm(&self.runtime, &self.clock, renew_at, move |at| {
                on_renew_expired(weak, at)
            });
    }

    /// Re-establish the invariant that stored bundles are valid, renewing
    /// the auth token when it is missing or stale.
    async fn reconcile(self: Arc<Self>, first_pass: bool) {
        if self.is_disposed() {
            return;
        }

        let state = self.store.get();
        let auth_valid = state.auth_valid_at(self.clock.now());
        let forced = first_pass && self.config.renew_on_mount;

        if !auth_valid || forced {
            match self.renew_token(None).await {
                Ok(_) => {
                    debug!(first_pass, "Reconciled by renewal");
                    return;
                }
                Err(err) => debug!(first_pass, error = %err, "Renewal during reconciliation failed"),
            }
        }

        let result = self.commit(|prev| {
            let now = self.clock.now();
            let mut next = prev.clone();
            if next.auth.as_ref().is_some_and(|bundle| !bundle.is_valid_at(now)) {
                next.auth = None;
            }
            if next.renew.as_ref().is_some_and(|bundle| !bundle.is_valid_at(now)) {
                next.renew = None;
            }
            next.initialized = true;
            next
        });

        match result {
            Ok(true) => debug!(first_pass, "Reconciled auth state"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Failed to persist reconciled auth state"),
        }
    }
}

impl<U, I> Drop for Inner<U, I> {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// Auth timer action: try to renew; if that fails, drop the auth bundle as
/// long as it is still the one whose expiry fired.
async fn on_auth_expired<U, I>(inner: Weak<Inner<U, I>>, at: DateTime<Utc>)
where
    U: UserProfile,
    I: Send + 'static,
{
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.is_disposed() {
        return;
    }

    info!(expired_at = %at, "Auth token expired, renewing");
    let Err(err) = inner.renew_token(None).await else {
        return;
    };

    debug!(error = %err, "Scheduled renewal failed, clearing auth token");
    let result = inner.commit(|prev| {
        let mut next = prev.clone();
        if prev.auth.as_ref().and_then(|bundle| bundle.expires_at) == Some(at) {
            next.auth = None;
        }
        next
    });
    if let Err(err) = result {
        warn!(error = %err, "Failed to persist expired auth state");
    }
}

/// Renew timer action: drop the renew bundle if it is still the expired one.
async fn on_renew_expired<U, I>(inner: Weak<Inner<U, I>>, at: DateTime<Utc>)
where
    U: UserProfile,
    I: Send + 'static,
{
    let Some(inner) = inner.upgrade() else {
        return;
    };

    info!(expired_at = %at, "Renew token expired");
    let result = inner.commit(|prev| {
        let mut next = prev.clone();
        if prev.renew.as_ref().and_then(|bundle| bundle.expires_at) == Some(at) {
            next.renew = None;
        }
        next
    });
    if let Err(err) = result {
        warn!(error = %err, "Failed to persist expired renew state");
    }
}
