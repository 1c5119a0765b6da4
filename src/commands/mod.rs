pub mod apply;
pub mod fs;
pub mod shell;

use crate::Context;
use crate::config::Config;
use crate::host::Host;
use crate::ui;
use anyhow::{Result, bail};
use converge::{Policy, ResultRecord};
use shellkit::Privilege;
use std::sync::mpsc::Receiver;

/// Global flags that shape how a host is reached and guarded.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub host: Option<String>,
    pub sudo: Option<String>,
    pub no_idempotent: bool,
    pub no_check_state: bool,
}

impl Options {
    fn policy(&self, base: Policy) -> Policy {
        Policy {
            idempotent: base.idempotent && !self.no_idempotent,
            check_state_first: base.check_state_first && !self.no_check_state,
        }
    }

    fn privilege(&self) -> Option<Privilege> {
        self.sudo.as_deref().map(|user| Privilege {
            user: (user != "root").then(|| user.to_string()),
        })
    }
}

/// An open host plus the channel its command outcomes arrive on.
pub struct Connection {
    pub host: Host,
    privilege: Option<Privilege>,
    results: Receiver<ResultRecord>,
}

impl Connection {
    pub fn open(ctx: &Context, options: &Options) -> Result<Self> {
        let config = Config::load()?;
        let policy = options.policy(config.policy);

        let host = match options.host.as_deref() {
            None | Some("localhost") => Host::local(policy),
            Some(name) => {
                let target = config.target(name);
                log::info!("Connecting to {} at {}", target.name, target.address);
                Host::remote(&target.name, &target.address, target.options, policy)
            }
        }
        .with_prompt(Box::new(ui::TerminalPrompt));

        let privilege = options.privilege();
        if privilege.is_some() {
            log::debug!("Commands on {} run through sudo", host.name());
        }
        if !ctx.quiet {
            host.bus().subscribe_all(ui::print_event);
        }
        let results = host.bus().subscribe_results();
        Ok(Self {
            host,
            privilege,
            results,
        })
    }

    /// Run `f` on the host, as the `--sudo` user when one was given.
    pub fn on_host<R>(&mut self, f: impl FnOnce(&mut Host) -> R) -> R {
        match &self.privilege {
            Some(privilege) => self.host.su(privilege.user.as_deref(), f),
            None => f(&mut self.host),
        }
    }

    /// Print outcomes published since the last call. False when any failed.
    pub fn report(&self, ctx: &Context) -> bool {
        let mut ok = true;
        for record in self.results.try_iter() {
            let failed = record.result.failed();
            ok &= !failed;
            if failed || !ctx.quiet {
                ui::print_result(&record);
            }
        }
        ok
    }

    /// Report and turn any failure into an error for the exit status.
    pub fn finish(&self, ctx: &Context) -> Result<()> {
        if self.report(ctx) {
            Ok(())
        } else {
            bail!("Some operations failed on {}", self.host.name())
        }
    }
}
