use std::path::{Component, Path, PathBuf};

/// Chuẩn hoá path để so sánh: absolute rồi canonicalize như OS resolve.
/// Nếu path chưa tồn tại: canonicalize ancestor sâu nhất đang có, phần
/// đuôi còn lại mới bỏ `.`/`..` theo chữ.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    if let Ok(resolved) = std::fs::canonicalize(&absolute) {
        return resolved;
    }

    // `..` phải đi sau symlink của phần head, nên không clean trước.
    let comps: Vec<Component> = absolute.components().collect();
    for split in (1..comps.len()).rev() {
        let head: PathBuf = comps[..split].iter().collect();
        let Ok(mut resolved) = std::fs::canonicalize(&head) else {
            continue;
        };
        for comp in &comps[split..] {
            match comp {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => resolved.push(other.as_os_str()),
            }
        }
        return resolved;
    }
    lexical_clean(&absolute)
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative key dùng trong cache: luôn nối bằng '/'.
/// Trả None nếu `path` không nằm dưới `root` hoặc tên không phải UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(s) => parts.push(s.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
