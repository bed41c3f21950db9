//! Mailbox address routing: `user+database@domain` carries both the tenant
//! username and the target database name.

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Tenant username: text before `+` (or before `@` when there is no `+`),
/// lowercased and stripped to `[a-z0-9]`. Empty when there is no `@`.
pub fn username_from_address(address: &str) -> String {
    let address = address.trim().to_lowercase();
    let Some(at_index) = address.find('@') else {
        return String::new();
    };
    let local = &address[..at_index];
    sanitize(local.split('+').next().unwrap_or("").trim())
}

/// Database name: text between the first `+` and `@`, same character filter.
/// Empty when there is no `+` segment; callers must treat that as
/// unroutable.
pub fn database_from_address(address: &str) -> String {
    let address = address.trim().to_lowercase();
    let Some(at_index) = address.find('@') else {
        return String::new();
    };
    let local = &address[..at_index];
    match local.split('+').nth(1) {
        Some(segment) => sanitize(segment),
        None => String::new(),
    }
}
