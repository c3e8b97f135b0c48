//! Random capacity realization by rejection sampling.
//!
//! Draws independent failures (per edge, or per LAG member where a link
//! has sub-links) and keeps the first draw the failure domain admits.
//! A draw budget bounds the rejection loop; exhausting it is a normal
//! outcome reported as `None`, not an error, so callers can distinguish
//! "domain is too tight for sampling" from misconfiguration.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::debug;

use tegap_core::{ConfigError, FailureDomain, FailureScenario, Topology};

/// Draw an admissible failure scenario, or `None` once `max_attempts`
/// draws were rejected.
pub fn sample_scenario(
    topo: &Topology,
    domain: &FailureDomain,
    rng: &mut impl Rng,
    max_attempts: usize,
) -> Result<Option<FailureScenario>, ConfigError> {
    domain.validate(topo)?;
    for attempt in 0..max_attempts {
        let mut scenario = FailureScenario::none();
        for link in topo.links() {
            if link.sub_links.is_empty() {
                if rng.gen::<f64>() < domain.prob_of(link) {
                    scenario.fail_edge(&link.src, &link.dst);
                }
            } else {
                for member in &link.sub_links {
                    if rng.gen::<f64>() < member.failure_weight {
                        scenario.fail_sub_link(&link.src, &link.dst, &member.id);
                    }
                }
            }
        }
        if domain.admits(topo, &scenario) {
            debug!(attempt, down = scenario.down_count(), "scenario accepted");
            return Ok(Some(scenario));
        }
    }
    debug!(max_attempts, "sampling budget exhausted");
    Ok(None)
}

/// Draw an admissible scenario and realize it as a per-edge capacity
/// map, LAG members partially surviving.
pub fn random_capacities(
    topo: &Topology,
    domain: &FailureDomain,
    rng: &mut impl Rng,
    max_attempts: usize,
) -> Result<Option<BTreeMap<(String, String), f64>>, ConfigError> {
    let Some(scenario) = sample_scenario(topo, domain, rng, max_attempts)? else {
        return Ok(None);
    };
    Ok(Some(
        topo.links()
            .map(|l| {
                (
                    (l.src.clone(), l.dst.clone()),
                    scenario.available_capacity(l),
                )
            })
            .collect(),
    ))
}
