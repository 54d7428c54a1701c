// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! CLI entry point: parses the `-v<N>` verbosity flag, installs signal
//! handlers, and wires a real `hidapi` backend into the library.

use std::env;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, SigHandler, Signal};

use rawhid_hub::backend::hidapi_backend::HidApiBackend;
use rawhid_hub::{Hub, HubConfig, Verbosity};

static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);
static SIGNAL_NUMBER: AtomicI32 = AtomicI32::new(0);

extern "C" fn handle_signal(signum: i32) {
    SIGNAL_NUMBER.store(signum, Ordering::Release);
    SIGNAL_RECEIVED.store(true, Ordering::Release);
}

fn install_signal_handlers() {
    let handler = SigHandler::Handler(handle_signal);
    // Safety: `handle_signal` only touches plain statics with atomic
    // stores, which is async-signal-safe.
    unsafe {
        signal::sigaction(Signal::SIGINT, &signal::SigAction::new(
            handler,
            signal::SaFlags::empty(),
            signal::SigSet::empty(),
        ))
        .expect("failed to install SIGINT handler");
        signal::sigaction(Signal::SIGTERM, &signal::SigAction::new(
            handler,
            signal::SaFlags::empty(),
            signal::SigSet::empty(),
        ))
        .expect("failed to install SIGTERM handler");
        signal::sigaction(Signal::SIGABRT, &signal::SigAction::new(
            handler,
            signal::SaFlags::empty(),
            signal::SigSet::empty(),
        ))
        .expect("failed to install SIGABRT handler");
    }
}

/// Polls the signal-handler statics and forwards a shutdown request to
/// the library's plain `Arc<AtomicBool>` contract. Kept as a separate
/// thread because the signal handler itself cannot touch an `Arc`.
fn spawn_signal_bridge(shutdown: Arc<AtomicBool>) {
    std::thread::spawn(move || loop {
        if SIGNAL_RECEIVED.load(Ordering::Acquire) {
            shutdown.store(true, Ordering::Release);
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    });
}

fn parse_verbosity(args: &[String]) -> Verbosity {
    for arg in args {
        if let Some(raw) = arg.strip_prefix("-v") {
            match raw.parse::<u8>() {
                Ok(n) => return Verbosity::from_arg(n),
                Err(_) => {
                    eprintln!("ignoring malformed verbosity argument: {arg}");
                }
            }
        }
    }
    Verbosity::empty()
}

fn main() -> ExitCode {
    env_logger::init();
    install_signal_handlers();

    let args: Vec<String> = env::args().skip(1).collect();
    let verbosity = parse_verbosity(&args);

    let backend = match HidApiBackend::new() {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            eprintln!("failed to start rawhid-hub: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = HubConfig {
        verbosity,
        ..HubConfig::default()
    };
    let hub = Hub::new(backend, config);
    spawn_signal_bridge(hub.shutdown_handle());

    if let Err(err) = hub.run() {
        eprintln!("rawhid-hub exited with an error: {err}");
        return ExitCode::FAILURE;
    }

    if SIGNAL_RECEIVED.load(Ordering::Acquire) {
        let signum = SIGNAL_NUMBER.load(Ordering::Acquire);
        return ExitCode::from(signum as u8);
    }
    ExitCode::SUCCESS
}
