//! Per-link traffic statistics

/// Bytes sent on one link since the previous statistics query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondingLinkStats {
    /// Link display name (interface kind or Ethernet device name)
    pub name: String,
    /// Bytes sent since the last query
    pub usage: u64,
}

/// Compute per-link byte-share percentages
///
/// Shares are floored; the last link absorbs the rounding remainder so the
/// result always sums to exactly 100. An empty input yields an empty result.
pub fn byte_share_percentages(usages: &[u64]) -> Vec<u32> {
    let total: u64 = usages.iter().sum();
    let mut percentages = Vec::with_capacity(usages.len());
    let mut assigned = 0u32;
    for (i, &usage) in usages.iter().enumerate() {
        if i + 1 == usages.len() {
            percentages.push(100 - assigned);
        } else {
            let share = if total == 0 {
                0
            } else {
                ((u128::from(usage) * 100) / u128::from(total)) as u32
            };
            percentages.push(share);
            assigned += share;
        }
    }
    percentages
}

/// Format a human-readable byte-share breakdown, e.g. `Cellular 47%, WiFi 53%`
pub fn format_connection_statistics(stats: &[BondingLinkStats]) -> Option<String> {
    if stats.is_empty() {
        return None;
    }
    let usages: Vec<u64> = stats.iter().map(|s| s.usage).collect();
    let percentages = byte_share_percentages(&usages);
    let parts: Vec<String> = stats
        .iter()
        .zip(percentages)
        .map(|(stat, share)| format!("{} {}%", stat.name, share))
        .collect();
    Some(parts.join(", "))
}
