//! rrwatch: Retro Rewind room tracker runtime binary.
//! One process per command; each runs its own engine and poll loop.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use rrwatch_core::RoomWatchEngine;

mod cli;
mod context;
mod dashboard;
mod poll_loop;
mod session_graph;
mod session_log;
mod settings;
mod sink;

use settings::Settings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("RRWATCH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(&args.config)?;

    match args.command {
        cli::Command::CheckConfig => check_config(&args.config, &settings)?,
        cli::Command::Notify(opts) => {
            let engine = build_engine(&settings)?;
            let interval = settings.notifier_interval(opts.interval);
            let use_color = context::resolve_color(&opts.color);
            let threshold = settings.vr_threshold;
            let mut notifier = sink::Notifier::new(
                vec![
                    Box::new(sink::TerminalSink::new(std::io::stdout(), use_color)),
                    Box::new(sink::OsNotifierSink::default()),
                ],
                threshold,
            );
            tracing::info!(threshold, grace = settings.vr_grace, ?interval, "notifier starting");
            poll_loop::PollLoop::new(poll_loop::http_fetcher()?, engine, interval)
                .run(&mut notifier)
                .await?;
        }
        cli::Command::Dashboard(opts) => {
            let engine = build_engine(&settings)?;
            let interval = settings.dashboard_interval(opts.interval);
            let view = dashboard::DashboardView {
                show_open_hosts: settings.dashboard.show_open_hosts,
                use_color: context::resolve_color(&opts.color),
            };
            let mut dash = dashboard::Dashboard::new(std::io::stdout(), view);
            tracing::info!(?interval, "dashboard starting");
            poll_loop::PollLoop::new(poll_loop::http_fetcher()?, engine, interval)
                .run(&mut dash)
                .await?;
        }
        cli::Command::Session(opts) => {
            let engine = build_engine(&settings)?;
            if engine.config().player_friend_code.is_none() {
                anyhow::bail!(
                    "session tracking needs [session] player_friend_code in {}",
                    args.config.display()
                );
            }
            let interval = settings.session_interval(opts.interval);
            let save_dir = settings.session.save.then(|| settings.session.dir.clone());
            let mut log = session_log::SessionLog::new(std::io::stdout(), save_dir);
            if settings.session.graph {
                log = log.with_graph(session_graph::SessionGraph::new(
                    settings.session.graph_path.clone(),
                    settings.session_goal(),
                ));
            }
            tracing::info!(?interval, "session tracker starting");
            poll_loop::PollLoop::new(poll_loop::http_fetcher()?, engine, interval)
                .run(&mut log)
                .await?;
        }
    }

    Ok(())
}

/// Validate before any polling starts. Invalid bounds are fatal.
fn build_engine(settings: &Settings) -> anyhow::Result<RoomWatchEngine> {
    RoomWatchEngine::new(settings.engine_config()).context("invalid configuration")
}

fn check_config(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    let engine = build_engine(settings)?;
    let cfg = engine.config();
    println!("config: {}", path.display());
    println!("  vr_threshold:      {}", cfg.vr_threshold);
    println!("  vr_grace:          {}", cfg.vr_grace);
    println!("  retro_tracks_only: {}", cfg.retro_tracks_only);
    println!(
        "  notify:            new_room={} became_joinable={} watchlist={}",
        cfg.notify.new_room, cfg.notify.became_joinable, cfg.notify.watchlist
    );
    println!("  watchlist:         {} code(s)", cfg.watchlist.len());
    match &cfg.player_friend_code {
        Some(code) => println!("  player:            {code}"),
        None => println!("  player:            (session tracking off)"),
    }
    if settings.session.graph {
        println!("  session graph:     {}", settings.session.graph_path.display());
    }
    if let Some(goal) = settings.session_goal() {
        println!("  goal:              {} ({})", goal.vr, goal.label);
    }
    println!("ok");
    Ok(())
}
