use promptdesk_types::*;

pub fn format_users(users: &[User]) -> String {
    if users.is_empty() {
        return "No users".to_string();
    }

    let id_width = users
        .iter()
        .map(|u| u.id.to_string().len() + 1)
        .max()
        .unwrap_or(0);
    let name_width = users.iter().map(|u| u.name.len()).max().unwrap_or(0);
    let email_width = users.iter().map(|u| u.email.len() + 2).max().unwrap_or(0);

    let mut lines: Vec<String> = users
        .iter()
        .map(|u| {
            format!(
                "{:<id_w$}  {:<name_w$}  {:<email_w$}  {}",
                format!("#{}", u.id),
                u.name,
                format!("<{}>", u.email),
                u.role,
                id_w = id_width,
                name_w = name_width,
                email_w = email_width,
            )
            .trim_end()
            .to_string()
        })
        .collect();

    lines.push(String::new());
    lines.push(format!("{} user(s)", users.len()));
    lines.join("\n")
}

pub fn format_user(user: &User) -> String {
    let mut lines = vec![
        format!("#{} {}", user.id, user.name),
        format!("  Email:   {}", user.email),
        format!("  Role:    {}", user.role),
        format!("  Avatar:  {}", user.avatar),
        format!("  Created: {}", user.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if let Some(updated_at) = user.updated_at {
        lines.push(format!(
            "  Updated: {}",
            updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    lines.join("\n")
}

pub fn format_selection_options(options: &[SelectionOption]) -> String {
    options
        .iter()
        .map(|o| format!("{}\t{}", o.user.id, o.label))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_session(current: Option<&User>) -> String {
    match current {
        Some(user) => format!("Logged in as {} <{}>", user.label(), user.email),
        None => "Not logged in".to_string(),
    }
}

pub fn format_store_info(info: &StoreInfo) -> String {
    let mut lines = vec![
        format!("Store: {}", info.path),
        format!(
            "  Size:  {} / {} ({} entries)",
            format_size(info.current_bytes),
            format_size(info.max_bytes),
            info.entries
        ),
        format!("  Users: {}", info.users),
    ];
    match &info.lock_path {
        Some(lock) => lines.push(format!("  Lock:  {}", lock)),
        None => lines.push("  Lock:  disabled".to_string()),
    }
    lines.join("\n")
}

pub fn format_profiling(functions: &[FunctionStats]) -> String {
    if functions.is_empty() {
        return "TIMING\n  (no spans recorded)".to_string();
    }

    let name_width = functions.iter().map(|f| f.name.len()).max().unwrap_or(0);
    let mut lines = vec!["TIMING".to_string()];
    for f in functions {
        lines.push(format!(
            "  {:<name_w$}  {:>5} calls  total {:>9}  avg {:>9}  p90 {:>9}  max {:>9}",
            f.name,
            f.calls,
            format_duration_us(f.total_us),
            format_duration_us(f.avg_us),
            format_duration_us(f.p90_us),
            format_duration_us(f.max_us),
            name_w = name_width,
        ));
    }
    lines.join("\n")
}

fn format_duration_us(us: u64) -> String {
    if us < 1000 {
        format!("{}µs", us)
    } else {
        format!("{:.2}ms", us as f64 / 1000.0)
    }
}

fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    }
}
