use std::io;

/// A request for the harness itself to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ShutdownEvent {
    #[strum(serialize = "SIGINT")]
    Interrupt,
    #[strum(serialize = "SIGTERM")]
    Term,
    #[strum(serialize = "SIGHUP")]
    Hangup,
}

/// Listens for Ctrl-C and termination requests sent to memjudge.
///
/// The program under test runs in its own process group, so a Ctrl-C typed at the terminal
/// never reaches it. Whoever drives the monitor has to pass these events on through
/// [`ExecutionMonitor::run_until`](super::ExecutionMonitor::run_until).
#[derive(Debug)]
pub struct ShutdownSignals {
    signals: Option<imp::Signals>,
}

impl ShutdownSignals {
    /// Starts listening. From here on the default "terminate the process" action for these
    /// signals is replaced by delivery to [`recv`](Self::recv).
    pub fn listen() -> io::Result<Self> {
        Ok(Self {
            signals: Some(imp::Signals::new()?),
        })
    }

    pub fn noop() -> Self {
        Self { signals: None }
    }

    /// Waits for the next event. Never resolves for [`noop`](Self::noop).
    pub async fn recv(&mut self) -> ShutdownEvent {
        if let Some(signals) = &mut self.signals {
            if let Some(event) = signals.recv().await {
                return event;
            }
        }
        std::future::pending().await
    }
}

#[cfg(unix)]
mod imp {
    use std::io;

    use tokio::signal::unix::{signal, Signal, SignalKind};

    use super::ShutdownEvent;

    #[derive(Debug)]
    pub(super) struct Signals {
        sigint: Signal,
        sigterm: Signal,
        sighup: Signal,
    }

    impl Signals {
        pub(super) fn new() -> io::Result<Self> {
            Ok(Self {
                sigint: signal(SignalKind::interrupt())?,
                sigterm: signal(SignalKind::terminate())?,
                sighup: signal(SignalKind::hangup())?,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            tokio::select! {
                Some(()) = self.sigint.recv() => Some(ShutdownEvent::Interrupt),
                Some(()) = self.sigterm.recv() => Some(ShutdownEvent::Term),
                Some(()) = self.sighup.recv() => Some(ShutdownEvent::Hangup),
                else => None,
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::io;

    use tokio::signal::windows::{ctrl_c, CtrlC};

    use super::ShutdownEvent;

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
    }

    impl Signals {
        pub(super) fn new() -> io::Result<Self> {
            Ok(Self { ctrl_c: ctrl_c()? })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            self.ctrl_c.recv().await.map(|()| ShutdownEvent::Interrupt)
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn noop_never_fires() {
        let mut signals = ShutdownSignals::noop();
        let res = tokio::time::timeout(Duration::from_millis(50), signals.recv()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn listen_installs_handlers() {
        let mut signals = ShutdownSignals::listen().unwrap();
        // Nothing has been sent yet.
        let res = tokio::time::timeout(Duration::from_millis(50), signals.recv()).await;
        assert!(res.is_err());
    }

    #[test]
    fn event_names() {
        assert_eq!(ShutdownEvent::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownEvent::Term.to_string(), "SIGTERM");
    }
}
