use anyhow::anyhow;

/// Parses `h:mm:ss`, `mm:ss` or plain seconds into whole seconds.
/// An empty string means "no boundary" and yields 0.
pub fn parse(input: &str) -> anyhow::Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(0);
    }

    let parts = input
        .split(':')
        .map(|p| {
            p.trim()
                .parse::<u64>()
                .map_err(|_| anyhow!("invalid time '{}'", input))
        })
        .collect::<anyhow::Result<Vec<u64>>>()?;

    let total = match parts.as_slice() {
        [s] => Some(*s),
        [m, s] => m.checked_mul(60).and_then(|v| v.checked_add(*s)),
        [h, m, s] => h
            .checked_mul(3600)
            .and_then(|v| v.checked_add(m.checked_mul(60)?))
            .and_then(|v| v.checked_add(*s)),
        _ => None,
    };
    total.ok_or_else(|| anyhow!("invalid time '{}'", input))
}

pub fn format(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
