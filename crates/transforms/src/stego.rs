//! Hides long literals inside synthetic audio resources.

use crate::carrier::{Carrier, WavCarrier};
use crate::inject::HelperRole;
use crate::session::Session;
use crate::util::literal_sites;
use crate::{Context, EditPlan, RewriteKind, Rewriter};
use shroud_core::lexer::utf16_len;
use shroud_core::SourceEdit;
use shroud_utils::errors::RewriteError;
use tracing::debug;

/// Literals longer than this many UTF-16 code units are hidden.
pub const DEFAULT_THRESHOLD: usize = 1000;

pub struct StegoRewriter {
    threshold: usize,
    carrier: Box<dyn Carrier>,
}

impl StegoRewriter {
    pub fn new(threshold: usize, carrier: Box<dyn Carrier>) -> Self {
        Self { threshold, carrier }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for StegoRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, Box::new(WavCarrier))
    }
}

impl std::fmt::Debug for StegoRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StegoRewriter")
            .field("threshold", &self.threshold)
            .field("carrier", &self.carrier.extension())
            .finish()
    }
}

impl Rewriter for StegoRewriter {
    fn kind(&self) -> RewriteKind {
        RewriteKind::Steganography
    }

    fn plan_unit(&self, ctx: &Context<'_>, unit: usize, session: &mut Session) -> Result<EditPlan, RewriteError> {
        let mut plan = EditPlan::new(unit);
        let Some(source) = ctx.program.unit(unit) else {
            return Ok(plan);
        };
        let tree = source.tree();
        let loader = HelperRole::ResourceLoader.reference(session);

        for site in literal_sites(tree) {
            if utf16_len(&site.value) <= self.threshold || tree.namespace_name_at(site.token) == session.namespace() {
                continue;
            }
            let container = self
                .carrier
                .encode(site.value.as_bytes(), session.generator().rng_mut())?;
            let name = session.fresh_identifier()?;
            debug!(
                "{}: hiding {}-byte literal as resource {} ({} bytes)",
                source.path(),
                site.value.len(),
                name,
                container.len()
            );
            session.add_payload(name.clone(), container);
            let call = format!("{loader}.GetPayloadFromWavFile({loader}.GetResourceBytes(\"{name}\"))");
            plan.push(SourceEdit::replace(site.span, site.wrap(call)));
        }
        Ok(plan.needs(HelperRole::ResourceLoader))
    }
}
