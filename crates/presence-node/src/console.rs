//! Operator console.
//!
//! Each stdin line is one command, parsed with the same clap derive the CLI
//! uses:
//!
//!   schedule --id <n> --start <ts> --end <ts> [--capability <level>]
//!   declare  <epoch> <actor> [--stake <amount>]
//!   vote     <epoch> <actor>
//!   leave    <epoch> <actor>
//!   slash    <epoch> <actor> [--reason <reason>]
//!   finalize <epoch>
//!   authorize <epoch> <actor> <feature>
//!   show     <epoch> [actor]
//!   participants | echoes | timeline <epoch>
//!   cache put|get|delete <epoch> <key> [value] | cache purge <epoch> | cache epochs
//!   tick

use std::fmt::Write as _;

use clap::{Parser, Subcommand, ValueEnum};
use presence_cache::EphemeralCacheExt;
use presence_consensus::VoteOutcome;
use presence_core::epoch::{Epoch, EpochCapability};
use presence_core::error::PresenceError;
use presence_core::gate::Feature;
use presence_core::presence::{Presence, SlashReason};
use presence_core::types::{Address, Balance, EpochId, Timestamp};
use presence_query::phase_timeline;

use crate::node::Node;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "console")]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

impl ConsoleLine {
    /// Parse one console line. Clap's usage text is returned as the error.
    pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
        Self::try_parse_from(line.split_whitespace())
            .map(|l| l.command)
            .map_err(|e| e.to_string())
    }
}

#[derive(Subcommand, Debug)]
pub enum ConsoleCommand {
    /// Schedule a new epoch.
    Schedule {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        start: Timestamp,
        #[arg(long)]
        end: Timestamp,
        #[arg(long, value_enum, default_value_t = CapabilityArg::PresenceOnly)]
        capability: CapabilityArg,
    },

    /// Declare an actor present in an active epoch.
    Declare {
        epoch: u64,
        actor: Address,
        #[arg(long)]
        stake: Option<Balance>,
    },

    /// Submit one validation vote for a declared presence.
    Vote { epoch: u64, actor: Address },

    /// Record an actor leaving; starts the echo.
    Leave { epoch: u64, actor: Address },

    Slash {
        epoch: u64,
        actor: Address,
        #[arg(long, value_enum, default_value_t = SlashArg::Policy)]
        reason: SlashArg,
    },

    /// Apply the finalization signal to a closed epoch.
    Finalize { epoch: u64 },

    /// Check whether an actor may use a feature right now.
    Authorize {
        epoch: u64,
        actor: Address,
        #[arg(value_enum)]
        feature: FeatureArg,
    },

    /// Describe an epoch, or one actor's presence in it.
    Show { epoch: u64, actor: Option<Address> },

    Participants { epoch: u64 },

    Echoes { epoch: u64 },

    Timeline { epoch: u64 },

    #[command(subcommand)]
    Cache(CacheCommand),

    /// Run the phase monitor once.
    Tick,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    Put { epoch: u64, key: String, value: String },
    Get { epoch: u64, key: String },
    Delete { epoch: u64, key: String },
    Purge { epoch: u64 },
    /// List epochs holding ephemeral data.
    Epochs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CapabilityArg {
    PresenceOnly,
    PresenceWithSignals,
    PresenceWithEphemeralData,
}

impl From<CapabilityArg> for EpochCapability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::PresenceOnly => EpochCapability::PresenceOnly,
            CapabilityArg::PresenceWithSignals => EpochCapability::PresenceWithSignals,
            CapabilityArg::PresenceWithEphemeralData => EpochCapability::PresenceWithEphemeralData,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FeatureArg {
    Discovery,
    Messaging,
    CaptureMedia,
    ViewMedia,
}

impl From<FeatureArg> for Feature {
    fn from(arg: FeatureArg) -> Self {
        match arg {
            FeatureArg::Discovery => Feature::Discovery,
            FeatureArg::Messaging => Feature::Messaging,
            FeatureArg::CaptureMedia => Feature::CaptureMedia,
            FeatureArg::ViewMedia => Feature::ViewMedia,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SlashArg {
    DoubleDeclaration,
    FalseValidation,
    Policy,
}

impl From<SlashArg> for SlashReason {
    fn from(arg: SlashArg) -> Self {
        match arg {
            SlashArg::DoubleDeclaration => SlashReason::DoubleDeclaration,
            SlashArg::FalseValidation => SlashReason::FalseValidation,
            SlashArg::Policy => SlashReason::PolicyViolation,
        }
    }
}

/// Run one console command against `node` and render the reply.
pub fn execute(node: &Node, command: ConsoleCommand, now: Timestamp) -> Result<String, PresenceError> {
    match command {
        ConsoleCommand::Schedule { id, start, end, capability } => {
            let epoch = node
                .engine
                .schedule_epoch(Epoch::new(EpochId::new(id), start, end, capability.into()))?;
            Ok(format!("scheduled epoch {} ({})", epoch.id, epoch.state(now)))
        }

        ConsoleCommand::Declare { epoch, actor, stake } => {
            let p = node.engine.declare_presence(EpochId::new(epoch), actor, stake, now)?;
            Ok(render_presence(&p, node.validator.quorum_size()))
        }

        ConsoleCommand::Vote { epoch, actor } => {
            let reply = match node.validator.submit_validation_vote(EpochId::new(epoch), actor, now)? {
                VoteOutcome::Counted { validation_count, votes_needed } => {
                    format!("vote counted ({validation_count}), {votes_needed} more needed")
                }
                VoteOutcome::Validated { validation_count } => {
                    format!("validated after {validation_count} votes")
                }
                VoteOutcome::Ignored { state } => format!("ignored, presence is {state}"),
                VoteOutcome::EpochClosed { state } => format!("ignored, epoch is {state}"),
            };
            Ok(reply)
        }

        ConsoleCommand::Leave { epoch, actor } => {
            let p = node.engine.leave_epoch(EpochId::new(epoch), actor, now)?;
            Ok(format!("{} left at {}", p.actor, p.left_at.unwrap_or(now)))
        }

        ConsoleCommand::Slash { epoch, actor, reason } => {
            let p = node.engine.slash(EpochId::new(epoch), actor, reason.into(), now)?;
            Ok(render_presence(&p, node.validator.quorum_size()))
        }

        ConsoleCommand::Finalize { epoch } => {
            let e = node.engine.finalize_epoch(EpochId::new(epoch), now)?;
            Ok(format!("epoch {} is {}", e.id, e.state(now)))
        }

        ConsoleCommand::Authorize { epoch, actor, feature } => {
            let feature = Feature::from(feature);
            match node.engine.authorize(EpochId::new(epoch), &actor, feature, now) {
                Ok(()) => Ok(format!("{feature}: allowed")),
                Err(e) => Ok(format!("{feature}: denied ({e})")),
            }
        }

        ConsoleCommand::Show { epoch, actor: None } => node.query().describe(EpochId::new(epoch), now),

        ConsoleCommand::Show { epoch, actor: Some(actor) } => {
            match node.query().fetch_presence(&actor, EpochId::new(epoch))? {
                Some(p) => Ok(render_presence(&p, node.validator.quorum_size())),
                None => Err(PresenceError::EpochNotFound(EpochId::new(epoch))),
            }
        }

        ConsoleCommand::Participants { epoch } => {
            let quorum = node.validator.quorum_size();
            let list = node.query().fetch_participants(EpochId::new(epoch))?;
            Ok(render_list(list.iter().map(|p| render_presence(p, quorum))))
        }

        ConsoleCommand::Echoes { epoch } => {
            let echoes = node.query().fetch_echoes(EpochId::new(epoch), now)?;
            Ok(render_list(
                echoes
                    .iter()
                    .map(|e| format!("{} opacity {:.2}", e.presence.actor.short(), e.opacity)),
            ))
        }

        ConsoleCommand::Timeline { epoch } => {
            let e = node.engine.epoch(EpochId::new(epoch))?;
            Ok(render_list(phase_timeline(&e, now).into_iter().map(|m| {
                let at = m.at.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
                let mark = if m.reached { "x" } else { " " };
                format!("[{mark}] {:<9} {at}", m.state.to_string())
            })))
        }

        ConsoleCommand::Cache(cmd) => Ok(execute_cache(node, cmd)),

        ConsoleCommand::Tick => {
            let report = node.monitor.tick(now)?;
            Ok(format!(
                "{} transitions, {} timer ticks, {} epochs purged",
                report.transitions.len(),
                report.timer_ticks,
                report.purged.len()
            ))
        }
    }
}

fn execute_cache(node: &Node, cmd: CacheCommand) -> String {
    let cache = node.cache.as_ref();
    match cmd {
        CacheCommand::Put { epoch, key, value } => {
            if cache.store(EpochId::new(epoch), &key, &value) {
                "stored".into()
            } else {
                "dropped".into()
            }
        }
        CacheCommand::Get { epoch, key } => cache
            .retrieve::<String>(EpochId::new(epoch), &key)
            .unwrap_or_else(|| "(absent)".into()),
        CacheCommand::Delete { epoch, key } => {
            cache.delete(EpochId::new(epoch), &key);
            "deleted".into()
        }
        CacheCommand::Purge { epoch } => {
            format!("purged {} keys", cache.purge_epoch(EpochId::new(epoch)))
        }
        CacheCommand::Epochs => {
            render_list(cache.cached_epoch_ids().into_iter().map(|id| id.to_string()))
        }
    }
}

fn render_presence(p: &Presence, quorum: u32) -> String {
    let mut line = format!("{} in epoch {}: {}", p.actor, p.epoch_id, p.state);
    if p.votes_needed(quorum) > 0 {
        let _ = write!(line, ", {} of {} votes", p.validation_count, quorum);
    }
    if let Some(reason) = &p.slash_reason {
        let _ = write!(line, ", slashed for {reason}");
    }
    if p.has_left() {
        line.push_str(", left");
    }
    line
}

fn render_list<I: IntoIterator<Item = String>>(items: I) -> String {
    let lines: Vec<String> = items.into_iter().collect();
    if lines.is_empty() {
        "(none)".into()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use presence_core::clock::{Clock, ManualClock};
    use std::sync::Arc;

    const ACTOR: &str = "0x00000000000000000000000000000000000000aA";

    fn run(node: &Node, clock: &ManualClock, line: &str, now: Timestamp) -> Result<String, PresenceError> {
        clock.set(now);
        let cmd = ConsoleLine::parse_line(line).expect("line parses");
        execute(node, cmd, now)
    }

    #[test]
    fn parses_commands() {
        assert!(matches!(
            ConsoleLine::parse_line("vote 3 0x00000000000000000000000000000000000000aa"),
            Ok(ConsoleCommand::Vote { epoch: 3, .. })
        ));
        assert!(matches!(
            ConsoleLine::parse_line("authorize 1 0x00000000000000000000000000000000000000aa capture-media"),
            Ok(ConsoleCommand::Authorize { feature: FeatureArg::CaptureMedia, .. })
        ));
        assert!(matches!(ConsoleLine::parse_line("cache epochs"), Ok(ConsoleCommand::Cache(CacheCommand::Epochs))));
        assert!(ConsoleLine::parse_line("vote 3 not-an-address").is_err());
        assert!(ConsoleLine::parse_line("explode").is_err());
    }

    #[test]
    fn console_session() {
        let clock = Arc::new(ManualClock::new(0));
        let node = Node::in_memory_with_clock(NodeConfig::default(), Arc::clone(&clock) as Arc<dyn Clock>)
            .unwrap();
        run(&node, &clock, "schedule --id 1 --start 100 --end 200 --capability presence-with-signals", 50).unwrap();

        let err = run(&node, &clock, &format!("declare 1 {ACTOR}"), 50).unwrap_err();
        assert!(matches!(err, PresenceError::EpochNotActive { .. }));

        let declared = run(&node, &clock, &format!("declare 1 {ACTOR}"), 120).unwrap();
        assert!(declared.contains("declared, 0 of 3 votes"), "{declared}");
        assert_eq!(
            run(&node, &clock, &format!("vote 1 {ACTOR}"), 121).unwrap(),
            "vote counted (1), 2 more needed"
        );
        assert_eq!(
            run(&node, &clock, &format!("authorize 1 {ACTOR} view-media"), 121).unwrap(),
            "view_media: denied (epoch capability presence_with_signals does not support view_media)"
        );
        assert_eq!(run(&node, &clock, &format!("authorize 1 {ACTOR} messaging"), 121).unwrap(), "messaging: allowed");

        assert_eq!(run(&node, &clock, "cache put 1 post:1 gm", 122).unwrap(), "stored");
        assert_eq!(run(&node, &clock, "cache get 1 post:1", 122).unwrap(), "gm");
        assert_eq!(run(&node, &clock, "cache epochs", 122).unwrap(), "1");

        run(&node, &clock, "tick", 150).unwrap();
        // Closed but not yet ticked: the data is already out of reach.
        assert_eq!(run(&node, &clock, "cache put 1 post:2 late", 200).unwrap(), "dropped");
        assert_eq!(run(&node, &clock, "cache get 1 post:1", 200).unwrap(), "(absent)");
        let tick = run(&node, &clock, "tick", 200).unwrap();
        assert_eq!(tick, "1 transitions, 0 timer ticks, 1 epochs purged");
        assert_eq!(run(&node, &clock, "cache get 1 post:1", 201).unwrap(), "(absent)");
        assert_eq!(run(&node, &clock, &format!("vote 1 {ACTOR}"), 201).unwrap(), "ignored, epoch is closed");
    }
}
