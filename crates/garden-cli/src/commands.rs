//! Subcommand implementations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use garden_backend::schema::{functions, tables};
use garden_backend::{Backend, MemoryBackend, SupabaseBackend};
use garden_common::{GardenError, NoticeQueue};
use garden_config::schema::GardenConfig;
use garden_tracking::status::fetch_profile;
use garden_tracking::{
    Assist, DerivedStatus, LocalState, PresenceUpdater, RoleChecker, TrackedView, UnreadCounter,
};

use crate::cli::{Args, Command};

/// The backend commands run against.
pub struct Backends {
    pub shared: Arc<dyn Backend>,
    memory: Option<MemoryBackend>,
    supabase: Option<Arc<SupabaseBackend>>,
}

impl Backends {
    pub fn connect(config: &GardenConfig, offline: bool) -> Result<Self, GardenError> {
        if offline || !config.backend.is_configured() {
            if !offline {
                warn!("Supabase is not configured, using the in-memory backend");
            }
            let memory = MemoryBackend::new();
            return Ok(Self {
                shared: Arc::new(memory.clone()),
                memory: Some(memory),
                supabase: None,
            });
        }

        let supabase = Arc::new(SupabaseBackend::new(&config.backend, &config.realtime)?);
        info!(url = %config.backend.base_url(), "Using Supabase backend");
        Ok(Self {
            shared: Arc::clone(&supabase) as Arc<dyn Backend>,
            memory: None,
            supabase: Some(supabase),
        })
    }

    async fn shutdown(&self) {
        if let Some(supabase) = &self.supabase {
            supabase.shutdown().await;
        }
    }
}

pub async fn run(args: Args, config: GardenConfig) -> Result<(), GardenError> {
    if let Command::Config = args.command {
        println!("{}", garden_config::config_to_json(&config));
        return Ok(());
    }
    if let Command::Announcement { version, mark } = &args.command {
        return announcement(version, *mark);
    }

    let backends = Backends::connect(&config, args.offline)?;
    let result = match args.command {
        Command::Track {
            paths,
            lab,
            user,
            dwell,
        } => {
            track(
                &backends,
                &config,
                &paths,
                lab.as_deref(),
                user.as_deref(),
                Duration::from_secs(dwell),
            )
            .await
        }
        Command::Unread { user, follow } => unread(&backends, &config, &user, follow).await,
        Command::Status { user } => status(&backends, &config, &user).await,
        Command::Translate { text, to } => {
            translate(&backends, &config, &text, to.map(Into::into)).await
        }
        Command::Config | Command::Announcement { .. } => Ok(()),
    };
    backends.shutdown().await;
    result
}

/// Sleep for `duration`; `false` if interrupted first.
async fn wait_or_interrupt(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            false
        }
    }
}

async fn track(
    backends: &Backends,
    config: &GardenConfig,
    paths: &[String],
    lab: Option<&str>,
    user: Option<&str>,
    dwell: Duration,
) -> Result<(), GardenError> {
    let mut view = TrackedView::new(Arc::clone(&backends.shared), &config.tracking);
    let presence = PresenceUpdater::new(Arc::clone(&backends.shared), &config.tracking);
    if let Some(user) = user {
        presence.begin_presence_loop(user);
    }

    for (index, path) in paths.iter().enumerate() {
        let session_id = if index == 0 {
            view.mount(path, lab, user)
        } else {
            view.navigate(path, lab, user)
        };
        info!(session_id = %session_id, page_path = %path, "Viewing");
        if !wait_or_interrupt(dwell).await {
            break;
        }
    }

    view.unmount();
    presence.end_presence_loop();
    view.flush().await;

    if let Some(memory) = &backends.memory {
        let signals = memory.function_calls(functions::SESSION_TRACKER).await;
        let summary = json!({
            "page_views": memory.rows(tables::PAGE_VIEWS).await,
            "session_signals": signals.iter().map(|c| &c.payload).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

async fn unread(
    backends: &Backends,
    config: &GardenConfig,
    user: &str,
    follow: bool,
) -> Result<(), GardenError> {
    let counter = UnreadCounter::new(Arc::clone(&backends.shared), &config.tracking);
    println!("{}", counter.get_unread_count(user).await);
    if !follow {
        return Ok(());
    }

    let mut updates = counter.watch();
    counter.subscribe(user, None);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *updates.borrow_and_update();
                println!("{count}");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    counter.clear();
    Ok(())
}

async fn status(
    backends: &Backends,
    config: &GardenConfig,
    user: &str,
) -> Result<(), GardenError> {
    let Some(profile) = fetch_profile(backends.shared.as_ref(), user).await else {
        return Err(GardenError::Other(format!("no profile for user {user}")));
    };
    let derived = DerivedStatus::resolve(&profile, &config.status.admin_display_list);
    let admin = RoleChecker::new(Arc::clone(&backends.shared))
        .is_admin(user)
        .await;

    let report = json!({
        "id": profile.id,
        "display_name": profile.display_name,
        "tier": derived.tier,
        "premium": derived.premium,
        "local_guide": derived.local_guide,
        "visit_count": profile.visit_count,
        "listed_admin": derived.listed_admin,
        "admin": admin,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn translate(
    backends: &Backends,
    config: &GardenConfig,
    text: &str,
    to: Option<garden_config::schema::Language>,
) -> Result<(), GardenError> {
    let notices = Arc::new(Mutex::new(NoticeQueue::default()));
    let assist = Assist::new(
        Arc::clone(&backends.shared),
        Arc::clone(&notices),
        config.locale.language,
    );
    match assist.translate(text, to).await {
        Ok(translated) => {
            println!("{translated}");
            Ok(())
        }
        Err(err) => {
            if let Ok(mut queue) = notices.lock() {
                for notice in queue.visible() {
                    eprintln!("{}: {}", notice.title, notice.body);
                }
            }
            Err(err.into())
        }
    }
}

fn announcement(version: &str, mark: bool) -> Result<(), GardenError> {
    let path = LocalState::default_path()
        .ok_or_else(|| GardenError::Other("could not determine data directory".into()))?;
    let mut state = LocalState::load(&path);
    if mark && state.mark_seen(version) {
        state.save(&path)?;
    }
    println!("{}", if state.has_seen(version) { "seen" } else { "unseen" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_backend_falls_back_to_memory() {
        let backends = Backends::connect(&GardenConfig::default(), false).unwrap();
        assert!(backends.memory.is_some());
        assert!(backends.supabase.is_none());
    }

    #[test]
    fn configured_backend_uses_supabase_unless_offline() {
        let mut config = GardenConfig::default();
        config.backend.project_ref = "abcdefghijklmnopqrst".into();
        config.backend.api_key = "anon".into();

        let online = Backends::connect(&config, false).unwrap();
        assert!(online.supabase.is_some());

        let offline = Backends::connect(&config, true).unwrap();
        assert!(offline.memory.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_track_records_views_and_signals() {
        let backends = Backends::connect(&GardenConfig::default(), true).unwrap();
        let paths = vec!["/dashboard".to_string(), "/labs".to_string()];
        track(
            &backends,
            &GardenConfig::default(),
            &paths,
            None,
            Some("u1"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let memory = backends.memory.as_ref().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(memory.rows(tables::PAGE_VIEWS).await.len(), 2);
        let actions: Vec<String> = memory
            .function_calls(functions::SESSION_TRACKER)
            .await
            .iter()
            .map(|c| c.payload["action"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(actions, vec!["start", "end", "start", "end"]);
    }

    #[tokio::test]
    async fn status_for_missing_profile_is_error() {
        let backends = Backends::connect(&GardenConfig::default(), true).unwrap();
        assert!(status(&backends, &GardenConfig::default(), "nobody")
            .await
            .is_err());
    }
}
