//! Thread role labels.
//!
//! Every long-lived thread is spawned with a role so logs and stack traces
//! identify what was running.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadRole {
    Io,
    Work,
    VoteProcessing,
    BlockProcessing,
    RequestLoop,
    BootstrapInitiator,
    BootstrapConnections,
    Voting,
    SignatureChecking,
    ConfirmationHeightProcessing,
    Worker,
    RequestAggregator,
    StateBlockSignatureVerification,
    EpochUpgrader,
    Alarm,
    PacketProcessing,
}

impl ThreadRole {
    pub fn name(&self) -> &'static str {
        match self {
            ThreadRole::Io => "io",
            ThreadRole::Work => "work",
            ThreadRole::VoteProcessing => "vote processing",
            ThreadRole::BlockProcessing => "block processing",
            ThreadRole::RequestLoop => "request loop",
            ThreadRole::BootstrapInitiator => "bootstrap init",
            ThreadRole::BootstrapConnections => "bootstrap conn",
            ThreadRole::Voting => "voting",
            ThreadRole::SignatureChecking => "signature check",
            ThreadRole::ConfirmationHeightProcessing => "conf height",
            ThreadRole::Worker => "worker",
            ThreadRole::RequestAggregator => "request aggreg",
            ThreadRole::StateBlockSignatureVerification => "state block sig",
            ThreadRole::EpochUpgrader => "epoch upgrader",
            ThreadRole::Alarm => "alarm",
            ThreadRole::PacketProcessing => "pkt processing",
        }
    }

    /// Spawn a labeled thread.
    pub fn spawn<F>(self, f: F) -> std::thread::JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::Builder::new()
            .name(self.name().to_string())
            .spawn(f)
            .expect("spawn labeled thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_thread_carries_name() {
        let handle = ThreadRole::Worker.spawn(|| {
            assert_eq!(std::thread::current().name(), Some("worker"));
        });
        handle.join().unwrap();
    }
}
