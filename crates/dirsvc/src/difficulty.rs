//! PoW difficulty retargeting.
//!
//! Runs when a DS block is proposed. The adjustment compares this epoch's
//! submission count against the nodes already in shards, moves at most
//! [`MAX_ADJUST_STEP`] per epoch, never drops below the configured floor,
//! and ratchets up by one at each one-year epoch boundary for the first
//! decade.

use tracing::{info, warn};

use crate::service::DirectoryService;

/// Largest per-epoch difficulty move, in either direction.
const MAX_ADJUST_STEP: i64 = 2;

/// Cap on the adjustment threshold so small networks still retarget.
const MAX_ADJUST_THRESHOLD: i64 = 99;

/// Years over which the annual ratchet applies.
const MAX_INCREASE_DIFFICULTY_YEARS: u64 = 10;

impl DirectoryService {
    /// Compute the shard-tier difficulty for the next DS block.
    pub fn calculate_new_difficulty(&self, current_difficulty: u8) -> u8 {
        let pow = &self.config.pow;

        let (pow_submissions, current_nodes) = {
            // all_pows precedes shards in the lock order.
            let pows = self.all_pows.lock();
            let shards = self.shards.lock();
            let nodes: i64 = shards.iter().map(|s| s.len() as i64).sum();
            (pows.len() as i64, nodes)
        };

        info!(
            current_nodes,
            pow_submissions, current_difficulty, "retargeting difficulty"
        );

        let mut adjustment: i64 = 0;
        if current_nodes > 0 && current_nodes != pow_submissions {
            let submissions_diff = match pow_submissions.checked_sub(current_nodes) {
                Some(d) => d,
                None => {
                    warn!("PoW submission difference overflowed");
                    0
                }
            };

            // Scale the threshold with the network size so the adjustment
            // still works on small networks.
            let mut adjust_threshold =
                current_nodes * pow.change_percent_to_adjust as i64 / 100;
            if adjust_threshold > MAX_ADJUST_THRESHOLD {
                adjust_threshold = MAX_ADJUST_THRESHOLD;
            }

            if submissions_diff.abs() < adjust_threshold {
                // Small swing: nudge toward the expected network size.
                if submissions_diff > 0 && pow_submissions > pow.expected_network_nodes as i64 {
                    adjustment = 1;
                } else if submissions_diff < 0
                    && pow_submissions < pow.expected_network_nodes as i64
                {
                    adjustment = -1;
                }
            } else {
                adjustment = match submissions_diff.checked_div(adjust_threshold) {
                    Some(a) => a,
                    None => {
                        warn!("difficulty adjustment division failed");
                        0
                    }
                };
            }
        }

        adjustment = adjustment.clamp(-MAX_ADJUST_STEP, MAX_ADJUST_STEP);

        let floor = i64::from(pow.difficulty);
        let mut new_difficulty =
            (i64::from(current_difficulty) + adjustment).max(floor).min(i64::from(u8::MAX)) as u8;

        // Annual ratchet: one extra unit per year for the first decade, so
        // stale hardware ages out of the network.
        let seconds_per_block =
            (pow.window_in_seconds / pow.final_blocks_per_pow) + (pow.tx_distribute_time_ms / 1000);
        if seconds_per_block > 0 {
            let mut blocks_per_year = (365 * 24 * 3600) / seconds_per_block;
            blocks_per_year = (blocks_per_year / pow.final_blocks_per_pow) * pow.final_blocks_per_pow;
            let epoch = self.current_epoch();
            if blocks_per_year > 0
                && epoch / blocks_per_year <= MAX_INCREASE_DIFFICULTY_YEARS
                && epoch % blocks_per_year == 0
            {
                info!(epoch, "one-year epoch boundary; increasing difficulty by 1");
                new_difficulty = new_difficulty.saturating_add(1);
            }
        }

        new_difficulty
    }
}
