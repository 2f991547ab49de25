use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use fluxsync::action::{PostAction, SiteAction, ThemeAction};
use fluxsync::config::{self, Config};
use fluxsync::model::{LocalId, PostStatus, SiteModel, ThemeModel};
use fluxsync::network::RestClient;
use fluxsync::{db, ChangeEvent, Clients, EventType, FluxContext, WaitOutcome};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the account's sites and list the cached ones
    Sites,
    /// Fetch themes for a site, or the WordPress.com catalogue with --wpcom
    Themes {
        #[arg(long, required_unless_present = "wpcom", conflicts_with = "wpcom")]
        site: Option<i64>,
        #[arg(long)]
        wpcom: bool,
    },
    /// Activate a theme on a site
    ActivateTheme {
        #[arg(long)]
        site: i64,
        #[arg(long)]
        theme: String,
    },
    /// Fetch posts (or pages) for a site
    Posts {
        #[arg(long)]
        site: i64,
        #[arg(long)]
        pages: bool,
        /// Fetch the next page instead of starting over
        #[arg(long)]
        more: bool,
    },
    /// Remove a site and everything cached for it
    RemoveSite {
        #[arg(long)]
        site: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = RestClient::from_config(&cfg.api)?;
    let ctx = FluxContext::new(pool, Clients::rest(client))?;

    let result = run(&ctx, &cfg, args.command).await;
    ctx.shutdown().await;
    result
}

async fn run(ctx: &FluxContext, cfg: &Config, command: Command) -> Result<()> {
    match command {
        Command::Sites => {
            let event = wait(ctx, cfg, SiteAction::FetchSites, EventType::SiteChanged).await?;
            info!(origin = ?event.origin(), "sites synced");
            for site in ctx.sites.get_sites().await? {
                println!(
                    "{:>4}  {:<40} {}{}",
                    site.id.map_or(0, |i| i.0),
                    site.url,
                    site.name,
                    if site.is_jetpack_connected { "  [jetpack]" } else { "" }
                );
            }
        }
        Command::Themes { site: None, .. } => {
            wait(ctx, cfg, ThemeAction::FetchWpComThemes, EventType::WpComThemesChanged).await?;
            print_themes(&ctx.themes.get_wpcom_themes().await?);
        }
        Command::Themes { site: Some(id), .. } => {
            let site = load_site(ctx, id).await?;
            wait(
                ctx,
                cfg,
                ThemeAction::FetchInstalledThemes(site.clone()),
                EventType::SiteThemesChanged,
            )
            .await?;
            print_themes(&ctx.themes.get_themes_for_site(&site).await?);
        }
        Command::ActivateTheme { site, theme } => {
            let site = load_site(ctx, site).await?;
            let target = ctx
                .themes
                .get_installed_theme_by_theme_id(&site, &theme)
                .await?
                .unwrap_or_else(|| ThemeModel::new(theme.clone(), theme.clone()));
            let event = wait(
                ctx,
                cfg,
                ThemeAction::activate(site, target),
                EventType::ThemeActivated,
            )
            .await?;
            if let ChangeEvent::ThemeActivated(e) = event {
                if let Some(theme) = e.theme {
                    println!("activated {} ({})", theme.name, theme.theme_id);
                }
            }
        }
        Command::Posts { site, pages, more } => {
            let site = load_site(ctx, site).await?;
            let action = if pages {
                PostAction::fetch_pages(site.clone(), more)
            } else {
                PostAction::fetch_posts(site.clone(), more)
            };
            let event = wait(ctx, cfg, action, EventType::PostChanged).await?;
            let posts = if pages {
                ctx.posts.get_pages_for_site(&site).await?
            } else {
                ctx.posts.get_posts_for_site(&site).await?
            };
            for post in &posts {
                println!(
                    "{:>4}  {:<10} {}",
                    post.remote_post_id.map_or(0, |r| r.0),
                    format!("{:?}", PostStatus::from_post(post)),
                    post.title
                );
            }
            if let ChangeEvent::PostChanged(e) = event {
                if e.can_load_more {
                    println!("(more available, rerun with --more)");
                }
            }
        }
        Command::RemoveSite { site } => {
            let site = load_site(ctx, site).await?;
            wait(ctx, cfg, SiteAction::RemoveSite(site.clone()), EventType::SiteRemoved).await?;
            println!("removed {}", site.url);
        }
    }
    Ok(())
}

async fn load_site(ctx: &FluxContext, id: i64) -> Result<SiteModel> {
    ctx.sites
        .get_site_by_local_id(LocalId(id))
        .await?
        .with_context(|| format!("no cached site with local id {id}; run `sites` first"))
}

async fn wait(
    ctx: &FluxContext,
    cfg: &Config,
    action: impl Into<fluxsync::Action>,
    event_type: EventType,
) -> Result<ChangeEvent> {
    match ctx
        .dispatcher
        .dispatch_and_wait(action, event_type, cfg.action_timeout())
        .await
    {
        WaitOutcome::Delivered(event) => match event.error() {
            Some(err) => Err(anyhow!("{err}")),
            None => Ok(event),
        },
        WaitOutcome::Indeterminate => bail!(
            "no answer within {:?}; the action may still complete",
            cfg.action_timeout()
        ),
    }
}

fn print_themes(themes: &[ThemeModel]) {
    for theme in themes {
        println!(
            "{} {:<24} {}",
            if theme.active { "*" } else { " " },
            theme.theme_id,
            theme.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn themes_takes_either_site_or_wpcom() {
        let args = Args::try_parse_from(["fluxsync", "themes", "--site", "3"]).unwrap();
        assert!(matches!(args.command, Command::Themes { site: Some(3), wpcom: false }));

        let args = Args::try_parse_from(["fluxsync", "themes", "--wpcom"]).unwrap();
        assert!(matches!(args.command, Command::Themes { site: None, wpcom: true }));

        assert!(Args::try_parse_from(["fluxsync", "themes"]).is_err());
        assert!(Args::try_parse_from(["fluxsync", "themes", "--site", "3", "--wpcom"]).is_err());
    }
}
