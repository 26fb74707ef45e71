//! Subcommand implementations.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokenkeeper_config_and_utils::{Config, Paths};
use tokenkeeper_core::{
    ActionResult, Expiration, FileStorage, LifecycleConfig, MemoryStorage, StorageBackends,
    StorageScope, TokenLifecycle,
};
use tracing::{info, warn};

/// The CLI carries the user payload as raw JSON and takes no sign-in input.
pub type Engine = TokenLifecycle<Value, ()>;

type AppResult<T> = Result<T, Box<dyn Error>>;

/// Arguments of the `set` subcommand.
#[derive(Debug, Clone)]
pub struct SetRequest {
    pub token: String,
    pub expires: Option<Expiration>,
    pub renew: Option<String>,
    pub renew_expires: Option<Expiration>,
    pub user: Option<Value>,
}

impl SetRequest {
    fn into_result(self) -> ActionResult<Value> {
        ActionResult {
            token: self.token,
            token_expiration: self.expires,
            renew: self.renew,
            renew_expiration: self.renew_expires,
            user: self.user,
        }
    }
}

fn lifecycle_config(config: &Config) -> LifecycleConfig<Value> {
    LifecycleConfig {
        storage_scope: config.storage_scope,
        key_prefix: config.key_prefix.clone(),
        development_token: config.development_token.clone(),
        renew_on_mount: config.renew_on_mount,
        ..Default::default()
    }
}

/// Session scope lives in memory for this process only; local scope is
/// file-backed under the storage directory.
fn backends(paths: &Paths) -> AppResult<StorageBackends> {
    paths.ensure_dirs()?;
    let local = FileStorage::new(paths.storage_dir())?;
    Ok(StorageBackends::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(local),
    ))
}

/// Mount an engine over the configured storage.
pub async fn open(config: &Config, paths: &Paths) -> AppResult<Engine> {
    if config.storage_scope == StorageScope::Session {
        warn!("Session scope does not outlive this process; use --scope local to persist");
    }

    let engine = Engine::builder()
        .config(lifecycle_config(config))
        .storage(backends(paths)?)
        .on_token_change(|_, token| info!(token_present = token.is_some(), "Token changed"))
        .mount()
        .await?;
    Ok(engine)
}

/// JSON summary of the engine state.
pub fn snapshot(engine: &Engine) -> Value {
    let state = engine.state();
    json!({
        "phase": engine.phase(),
        "authenticated": engine.is_authenticated(),
        "token_present": engine.token().is_some(),
        "expires_at": state.auth.as_ref().and_then(|bundle| bundle.expires_at),
        "renew_present": state.renew.is_some(),
        "renew_expires_at": state.renew.as_ref().and_then(|bundle| bundle.expires_at),
        "user": state.user,
        "storage_key": engine.storage_key(),
        "scope": engine.storage_scope(),
    })
}

fn print(value: &Value) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Write the effective configuration to the config file.
pub fn init(config: &Config, paths: &Paths) -> AppResult<()> {
    config.save(paths)?;
    info!(path = %paths.config_file().display(), "Wrote configuration");
    print(&serde_json::to_value(config)?)
}

pub async fn status(config: &Config, paths: &Paths) -> AppResult<()> {
    let engine = open(config, paths).await?;
    print(&snapshot(&engine))?;
    engine.shutdown();
    Ok(())
}

pub async fn sign_in(config: &Config, paths: &Paths) -> AppResult<()> {
    let engine = open(config, paths).await?;
    engine.sign_in(()).await?;
    print(&snapshot(&engine))?;
    engine.shutdown();
    Ok(())
}

pub async fn set(config: &Config, paths: &Paths, request: SetRequest) -> AppResult<()> {
    let engine = open(config, paths).await?;
    engine.set_auth(request.into_result())?;
    print(&snapshot(&engine))?;
    engine.shutdown();
    Ok(())
}

pub async fn sign_out(config: &Config, paths: &Paths) -> AppResult<()> {
    let engine = open(config, paths).await?;
    engine.sign_out(None).await?;
    info!("Signed out");
    engine.shutdown();
    Ok(())
}

pub async fn watch(config: &Config, paths: &Paths, seconds: Option<u64>) -> AppResult<()> {
    let engine = open(config, paths).await?;
    print(&snapshot(&engine))?;

    let snapshots = engine.clone();
    let id = engine.subscribe(move |_| {
        info!(phase = ?snapshots.phase(), "Auth state changed");
    });

    let deadline = async {
        match seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = deadline => info!("Watch duration elapsed"),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted");
        }
    }

    engine.unsubscribe(id);
    print(&snapshot(&engine))?;
    engine.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn local_config() -> Config {
        Config {
            storage_scope: StorageScope::Local,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_set_persists_across_invocations() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = local_config();

        let request = SetRequest {
            token: "abc".to_string(),
            expires: Some(Expiration::Seconds(3600.0)),
            renew: Some("r1".to_string()),
            renew_expires: None,
            user: Some(json!({ "id": 1 })),
        };
        set(&config, &paths, request).await.unwrap();

        let engine = open(&config, &paths).await.unwrap();
        let summary = snapshot(&engine);
        assert_eq!(summary["phase"], json!("authenticated"));
        assert_eq!(summary["token_present"], json!(true));
        assert_eq!(summary["renew_present"], json!(true));
        assert_eq!(summary["user"], json!({ "id": 1 }));
        assert_eq!(summary["scope"], json!("local"));
        assert!(summary["expires_at"].is_string());
    }

    #[tokio::test]
    async fn test_sign_out_clears_persisted_state() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = local_config();

        let engine = open(&config, &paths).await.unwrap();
        engine.set_auth(ActionResult::new("abc")).unwrap();
        engine.shutdown();

        sign_out(&config, &paths).await.unwrap();

        let engine = open(&config, &paths).await.unwrap();
        assert_eq!(snapshot(&engine)["phase"], json!("unauthenticated"));
    }

    #[tokio::test]
    async fn test_sign_in_requires_development_token() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let err = sign_in(&local_config(), &paths).await.unwrap_err();
        assert_eq!(err.to_string(), "No sign-in handler configured");

        let config = Config {
            development_token: Some("dev-token".to_string()),
            ..local_config()
        };
        sign_in(&config, &paths).await.unwrap();

        let engine = open(&config, &paths).await.unwrap();
        assert_eq!(engine.storage_key(), "dev:tokenkeeper:auth");
        assert_eq!(engine.token().as_deref(), Some("dev-token"));
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("home"));
        let config = Config {
            key_prefix: "app:".to_string(),
            ..local_config()
        };

        init(&config, &paths).unwrap();

        assert!(paths.storage_dir().is_dir());
        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_lifecycle_config_mapping() {
        let config = Config {
            key_prefix: "app:".to_string(),
            renew_on_mount: true,
            ..local_config()
        };
        let mapped = lifecycle_config(&config);
        assert_eq!(mapped.storage_scope, StorageScope::Local);
        assert_eq!(mapped.key_prefix, "app:");
        assert!(mapped.renew_on_mount);
        assert!(!mapped.development_signed_in);
    }
}
