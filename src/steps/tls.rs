//! Optional Let's Encrypt TLS via the certbot snap.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};
use crate::prompt;

/// Request and install a TLS certificate for the site.
///
/// Opt-in, and gated behind a DNS confirmation: automated domain validation
/// can only succeed once the site name resolves to this host.
#[derive(Debug)]
pub struct IssueTlsCertificate;

impl Step for IssueTlsCertificate {
    fn name(&self) -> &str {
        "Issue TLS certificate"
    }

    fn check(&self, _ctx: &Context) -> Result<StepState> {
        // Whether a certificate is wanted is an operator decision, not host
        // state; certbot itself is idempotent for an already-issued domain.
        Ok(StepState::Pending)
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        if !ctx.request_tls()? {
            return Ok(StepOutcome::declined("TLS not requested"));
        }
        let site = ctx.site_name()?;
        let dns_ready = prompt::ask_yes_no(
            ctx.prompt.as_ref(),
            &format!("Does {site} already point at this host's public address"),
        )?;
        if !dns_ready {
            ctx.log
                .warn("point DNS at this host first, then re-run to issue the certificate");
            return Ok(StepOutcome::declined("DNS not confirmed"));
        }

        if !ctx.executor.which("certbot") {
            ctx.log.info("installing certbot via snap");
            ctx.executor.run("sudo", &["snap", "install", "core"])?;
            ctx.executor.run("sudo", &["snap", "refresh", "core"])?;
            ctx.executor
                .run("sudo", &["snap", "install", "--classic", "certbot"])?;
            ctx.executor.run(
                "sudo",
                &["ln", "-sf", "/snap/bin/certbot", "/usr/bin/certbot"],
            )?;
        }

        ctx.executor
            .run("sudo", &["certbot", "--nginx", "-d", &site])?;
        ctx.set_tls_issued();
        Ok(StepOutcome::Applied)
    }
}
