use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use bootcraft::{
    available_modes, config, logging, AppConfig, Env, ListConfig, ListEvents, ListState, Mode,
    Rule, RuleKind, SettingsStore,
};

#[derive(Debug, Parser)]
#[command(name = "bootcraft", version, about = "Boot menu configuration manager for GRUB 2 and BURG")]
struct Args {
    /// Manage the BURG flavour instead of GRUB 2
    #[arg(long, global = true)]
    burg: bool,
    /// Operate on an installation mounted under this prefix
    #[arg(long, global = true)]
    root: Option<String>,
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Load the configuration and print the menu tree
    List {
        /// Include hidden entries
        #[arg(long)]
        all: bool,
    },
    /// Commit the current proxy layout and regenerate the boot config
    Save,
    /// Show which bootloader flavours are installed
    Modes,
    /// Remove stale forwarders left behind by an interrupted run
    Cleanup,
    /// Read or change the bootloader settings file
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCmd {
    /// Print all settings
    Show,
    /// Print one setting's value
    Get { name: String },
    /// Update or append one setting
    Set { name: String, value: String },
}

/// Progress sink for terminal use: progress goes to the log, failures
/// to stderr.
struct CliEvents;

impl ListEvents for CliEvents {
    fn load_progress_changed(&self, progress: f64) {
        log::debug!("load progress: {:.0}%", progress * 100.0);
    }

    fn save_progress_changed(&self, progress: f64) {
        log::debug!("save progress: {:.0}%", progress * 100.0);
    }

    fn thread_died(&self, message: &str) {
        log::error!("{}", message);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;
    if let Ok(dir) = config::get_config_dir() {
        logging::init_log_dir(dir);
    }
    logging::setup_panic_hook();

    let prefs = AppConfig::load();
    let mode = if args.burg || prefs.use_burg {
        Mode::Burg
    } else {
        Mode::Grub
    };
    let root = args.root.clone().unwrap_or_else(|| prefs.root_prefix.clone());
    let env = Env::probe(mode, &root);

    match args.cmd {
        Cmd::List { all } => {
            let cfg = load_configuration(&env)?;
            if cfg.config_differs_on_startup {
                log::warn!("the saved boot config differs from the current menu layout");
            }
            print_menu(&cfg, all);
        }
        Cmd::Save => {
            let mut cfg = load_configuration(&env)?;
            cfg.save(&env);
            if cfg.state() != ListState::Saved {
                bail!("save failed: {}", cfg.message());
            }
            if cfg.error_proxy_not_found {
                log::warn!(
                    "the rule interpreter binary is missing, customizations are inactive \
                     until it is installed"
                );
            }
            let mut prefs = prefs;
            prefs.use_burg = mode == Mode::Burg;
            prefs.root_prefix = root;
            if let Err(e) = prefs.save() {
                log::warn!("couldn't persist preferences: {}", e);
            }
            println!("boot configuration written to {}", env.output_config_file.display());
        }
        Cmd::Modes => {
            let modes = available_modes(&root);
            if modes.is_empty() {
                bail!("no supported bootloader found under '{}'", root);
            }
            for mode in modes {
                println!("{}", mode);
            }
        }
        Cmd::Cleanup => {
            let cfg = ListConfig::new(Arc::new(CliEvents));
            if cfg.cfg_dir_is_clean(&env) {
                println!("{} is clean", env.cfg_dir.display());
            } else {
                cfg.cleanup_cfg_dir(&env);
                println!("removed stale forwarders from {}", env.cfg_dir.display());
            }
        }
        Cmd::Settings { cmd } => run_settings(&env, cmd)?,
    }
    Ok(())
}

fn load_configuration(env: &Env) -> Result<ListConfig> {
    if !env.is_usable() {
        bail!("{} not found. Is {} installed?", env.cfg_dir.display(), env.mode);
    }
    let mut cfg = ListConfig::new(Arc::new(CliEvents));
    if !cfg.cfg_dir_is_clean(env) {
        log::warn!("found leftovers of an interrupted run, cleaning up");
        cfg.cleanup_cfg_dir(env);
    }
    cfg.load(env, false);
    if cfg.state() != ListState::Loaded {
        bail!("load failed: {}", cfg.message());
    }
    Ok(cfg)
}

fn print_menu(cfg: &ListConfig, show_hidden: bool) {
    for proxy in cfg.proxies.iter() {
        let script_name = proxy
            .data_source
            .map(|handle| cfg.repository.script(handle).name.clone())
            .unwrap_or_else(|| "(unresolved)".to_string());
        println!("[{:02}] {}", proxy.index, script_name);
        print_rules(&proxy.rules, 1, show_hidden);
    }
}

fn print_rules(rules: &[Rule], depth: usize, show_hidden: bool) {
    for rule in rules {
        if !rule.is_visible && !show_hidden {
            continue;
        }
        let indent = "  ".repeat(depth);
        let marker = if rule.is_visible { ' ' } else { '-' };
        match rule.kind {
            RuleKind::Normal => {
                let orphaned = if rule.data_source.is_none() { " (orphaned)" } else { "" };
                println!("{}{}{}{}", indent, marker, rule.output_name, orphaned);
            }
            RuleKind::Submenu => {
                println!("{}{}{}/", indent, marker, rule.output_name);
                print_rules(&rule.sub_rules, depth + 1, show_hidden);
            }
            RuleKind::Wildcard => {
                println!("{} *", indent);
            }
        }
    }
}

fn run_settings(env: &Env, cmd: SettingsCmd) -> Result<()> {
    let path = &env.settings_file;
    let mut store = SettingsStore::from_file(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    match cmd {
        SettingsCmd::Show => {
            for row in store.settings() {
                let state = if row.is_active { ' ' } else { '#' };
                println!("{}{}={}", state, row.name, row.value);
            }
        }
        SettingsCmd::Get { name } => match store.get_value(&name) {
            Some(value) => println!("{}", value),
            None => bail!("{} is not set in {}", name, path.display()),
        },
        SettingsCmd::Set { name, value } => {
            let updated = store.set_value(&name, &value);
            store
                .save_to_file(path)
                .with_context(|| format!("cannot write {}", path.display()))?;
            if updated {
                println!("{} updated", name);
            } else {
                println!("{} added", name);
            }
        }
    }
    Ok(())
}
