//! Shared document sessions with autosave, against an in-memory store.
//!
//! Run with: cargo run -p autosave-demo [config.json]
//!
//! The optional config is a `SessionConfig` JSON document, e.g.
//! `{"autosave": {"enabled": true, "interval_secs": 1}}`.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use docsession_core::{
    AutoResolve, AutosaveConfig, ConflictResolution, Content, SessionConfig, SessionContext,
};
use docsession_registry::{ModelFactoryRecord, Registration, TypeRegistry, WidgetFactoryRecord};
use docsession_session::{MemoryContentStore, SessionManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,docsession_session=debug".into()),
        )
        .init();

    let config = load_config()?;
    let interval = config.autosave.interval();

    let registry = Arc::new(TypeRegistry::new());
    for registration in [
        registry.add_model_factory(ModelFactoryRecord::text()),
        registry.add_model_factory(ModelFactoryRecord::base64()),
        registry.add_widget_factory(
            WidgetFactoryRecord::builder("Editor", "text")
                .file_extensions([".txt", ".md"])
                .default_for([".txt", ".md"])
                .build(),
        ),
        registry.add_widget_factory(
            WidgetFactoryRecord::builder("Hex", "base64")
                .file_extensions([".bin"])
                .default_for([".bin"])
                .build(),
        ),
    ] {
        if let Registration::Rejected(err) = registration {
            anyhow::bail!("registration failed: {err}");
        }
    }

    let store = Arc::new(MemoryContentStore::new());
    store.write_external("notes.txt", Content::Text("first draft".into()));
    store.write_external("readme.md", Content::Text("# Demo".into()));
    store.write_external("logo.bin", Content::Base64("AAEC".into()));

    let manager = SessionManager::new(
        Arc::clone(&registry),
        Arc::clone(&store) as _,
        Arc::new(AutoResolve(ConflictResolution::Overwrite)),
        &config,
    );

    let widgets = futures::future::join_all(
        ["notes.txt", "readme.md", "logo.bin", "notes.txt"]
            .into_iter()
            .map(|path| manager.open(path, "default", None)),
    )
    .await;
    let widgets: Vec<_> = widgets.into_iter().flatten().collect();
    for widget in &widgets {
        widget.context().ready().await?;
        tracing::info!(
            path = %widget.context().path(),
            factory = %widget.factory_name(),
            context = %widget.context().id(),
            "Widget ready"
        );
    }
    tracing::info!(
        widgets = widgets.len(),
        contexts = manager.open_contexts().await.len(),
        "Documents open"
    );

    let notes = widgets
        .first()
        .map(|widget| Arc::clone(widget.context()))
        .context("notes.txt did not open")?;

    edit(&notes, "second draft")?;
    tokio::time::sleep(interval + Duration::from_millis(500)).await;
    tracing::info!(content = ?store.content("notes.txt"), "After autosave");

    // Another client writes the file; the next autosave sees the conflict.
    store.write_external("notes.txt", Content::Text("edited elsewhere".into()));
    edit(&notes, "third draft")?;
    tokio::time::sleep(interval + Duration::from_millis(500)).await;
    tracing::info!(content = ?store.content("notes.txt"), "After conflict");

    if let Some(autosave) = manager.autosave_for(&notes).await {
        tracing::info!(state = ?autosave.state(), "Autosave state");
    }

    manager
        .rename_file("notes.txt", "notes-final.txt")
        .await
        .context("rename failed")?;
    tracing::info!(path = %notes.path(), "Renamed");

    manager.dispose().await;
    Ok(())
}

fn load_config() -> anyhow::Result<SessionConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(SessionConfig {
            autosave: AutosaveConfig {
                enabled: true,
                interval_secs: 1,
            },
        });
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    Ok(SessionConfig::from_json(&raw)?)
}

fn edit(context: &SessionContext, text: &str) -> anyhow::Result<()> {
    context.model().load_content(Content::Text(text.into()))?;
    context.model().set_dirty(true);
    Ok(())
}
