// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of custorg.
//
// custorg is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// custorg is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with custorg.  If not,
// see <http://www.gnu.org/licenses/>.

//! # custorgd
//!
//! CRUD over a collection of customer-organization records.
//!
//! The daemon reads its configuration once at startup (a TOML file, or the `MONGODB_*`
//! environment variables when run without one), constructs the storage handle, and serves the
//! Organizations API until SIGINT/SIGTERM.

use std::{fs, net::SocketAddr, path::PathBuf, sync::Arc};

use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, Command};
use serde::Deserialize;
use snafu::prelude::*;
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    Registry,
};

use custorg::{
    custorg::CustOrg,
    mongodb::{Client, Location},
    orgs::make_router,
};

/// The custorgd application error type
///
/// Note that we do not derive [Debug] for this error. `main()` returns `Result<(), Error>`, and
/// on the `Err` variant the Rust runtime uses the `Debug` implementation to produce an error
/// message on stderr; the derived implementation is not very readable, so `Debug` here delegates
/// to `Display`.
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to bind to {address}: {source}"))]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("Unable to read configuration file {pth:?}: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Error parsing configuration file {pth:?}: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("No configuration file given and MONGODB_URI is not set in the environment"))]
    NoStorage,
    #[snafu(display("While serving requests: {source}"))]
    Serve { source: std::io::Error },
    #[snafu(display("Failed to reach storage: {source}"))]
    Storage { source: custorg::mongodb::Error },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Logging-related options read from the command line
struct LogOpts {
    pub level: Level,
}

impl LogOpts {
    fn new(matches: &clap::ArgMatches) -> LogOpts {
        LogOpts {
            level: match (
                matches.get_flag("debug"),
                matches.get_flag("verbose"),
                matches.get_flag("quiet"),
            ) {
                (true, _, _) => Level::TRACE,
                (false, true, _) => Level::DEBUG,
                (false, false, true) => Level::ERROR,
                (_, _, _) => Level::INFO,
            },
        }
    }
}

/// custorgd configuration, version one
#[derive(Clone, Debug, Deserialize)]
struct ConfigV1 {
    /// Local address at which to listen; specify as "address:port"
    #[serde(default = "ConfigV1::default_address")]
    address: SocketAddr,
    /// Where to find the backing collection; loaded once, never re-read per request
    #[serde(rename = "storage-config")]
    storage_config: Location,
}

impl ConfigV1 {
    fn default_address() -> SocketAddr {
        "127.0.0.1:3000".parse().unwrap(/* known good */)
    }
}

fn load_config(pth: Option<&PathBuf>) -> Result<ConfigV1> {
    match pth {
        Some(pth) => {
            let text = fs::read_to_string(pth).context(ConfigNotFoundSnafu { pth: pth.clone() })?;
            toml::from_str(&text).context(ConfigParseSnafu { pth: pth.clone() })
        }
        None => Ok(ConfigV1 {
            address: ConfigV1::default_address(),
            storage_config: Location::from_env().context(NoStorageSnafu)?,
        }),
    }
}

fn setup_logging(opts: &LogOpts) -> Result<()> {
    // RUST_LOG, when set, refines the level chosen on the command line.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(opts.level).into())
        .from_env()
        .context(EnvFilterSnafu)?;
    let subscriber = Registry::default().with(filter).with(fmt::layer());
    tracing::subscriber::set_global_default(subscriber).context(SubscriberSnafu)
}

fn cli() -> Command {
    Command::new("custorgd")
        .version(crate_version!())
        .author(crate_authors!())
        .about("CRUD over a collection of customer-organization records")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("path to a TOML configuration file (without one, storage comes from MONGODB_URI &c)"),
        )
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("produce TRACE-level output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("produce DEBUG-level output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("only produce ERROR-level output"),
        )
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install the SIGTERM handler: {}", err);
                std::future::pending::<()>().await
            }
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => (),
        _ = terminate => (),
    }
    info!("custorgd shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    setup_logging(&LogOpts::new(&matches))?;

    let config = load_config(matches.get_one::<PathBuf>("config"))?;
    let storage = Client::new(&config.storage_config)
        .await
        .context(StorageSnafu)?;
    let state = Arc::new(CustOrg {
        storage: Arc::new(storage),
    });
    let app = make_router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.address).await.context(BindSnafu {
        address: config.address,
    })?;
    info!("custorgd listening on {}", config.address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(ServeSnafu)
}
