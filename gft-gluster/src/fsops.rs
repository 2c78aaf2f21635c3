// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Plain filesystem operations run on mounts and bricks. These wrap the
//! coreutils spellings the scenarios assert against; anything parsed
//! returns `Ok(None)` when the command failed.

use std::path::Path;

use crate::{CmdOutput, RemoteExec, SshError};
use gft_wire_types::FileStat;

pub async fn mkdir_p(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("mkdir -p {}", path)).await
}

pub async fn rm_rf(exec: &dyn RemoteExec, host: &str, path: &str) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("rm -rf {}", path)).await
}

/// Entries of a directory, one name per line of `ls -A`. `pattern` narrows
/// the listing with a shell glob.
pub async fn ls(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    pattern: Option<&str>,
) -> Result<Option<Vec<String>>, SshError> {
    let cmd = match pattern {
        Some(p) => format!("cd {} && ls -A -d {}", path, p),
        None => format!("ls -A {}", path),
    };

    let out = exec.run(host, &cmd).await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(Some(
        out.stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
    ))
}

pub async fn touch(exec: &dyn RemoteExec, host: &str, path: &str) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("touch {}", path)).await
}

/// Write `count` blocks of `bs` from /dev/urandom into `path`.
pub async fn dd(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    bs: &str,
    count: u64,
) -> Result<CmdOutput, SshError> {
    exec.run(
        host,
        &format!(
            "dd if=/dev/urandom of={} bs={} count={} conv=fsync",
            path, bs, count
        ),
    )
    .await
}

pub(crate) fn parse_stat_line(line: &str) -> Option<FileStat> {
    let mut cols = line.split_whitespace();

    Some(FileStat {
        mode: u32::from_str_radix(cols.next()?, 8).ok()?,
        user: cols.next()?.to_string(),
        group: cols.next()?.to_string(),
        size: cols.next()?.parse().ok()?,
        inode: cols.next()?.parse().ok()?,
        links: cols.next()?.parse().ok()?,
    })
}

/// Parsed `stat` of one path.
pub async fn stat_path(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
) -> Result<Option<FileStat>, SshError> {
    let out = exec
        .run(host, &format!("stat --format '%a %U %G %s %i %h' {}", path))
        .await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(parse_stat_line(out.stdout.trim()))
}

/// One extended attribute, hex-encoded as `getfattr -e hex` prints it
/// (`0x...`). The raw encoding is preserved so afr/dht attribute values can
/// be compared byte for byte.
pub async fn get_fattr(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    key: &str,
) -> Result<Option<String>, SshError> {
    let out = exec
        .run(
            host,
            &format!("getfattr --absolute-names -e hex -n {} {}", key, path),
        )
        .await?;

    if !out.success() {
        return Ok(None);
    }

    let wanted = format!("{}=", key);

    Ok(out
        .stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix(wanted.as_str()))
        .map(String::from))
}

pub async fn set_fattr(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    key: &str,
    value: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("setfattr -n {} -v {} {}", key, value, path))
        .await
}

pub async fn del_fattr(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    key: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("setfattr -x {} {}", key, path)).await
}

pub async fn ln(
    exec: &dyn RemoteExec,
    host: &str,
    target: &str,
    link: &str,
    symbolic: bool,
) -> Result<CmdOutput, SshError> {
    let flag = if symbolic { "-s " } else { "" };

    exec.run(host, &format!("ln {}{} {}", flag, target, link)).await
}

pub async fn chmod(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    mode: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("chmod {} {}", mode, path)).await
}

pub async fn chown(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    user: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("chown {} {}", user, path)).await
}

pub async fn chgrp(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
    group: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("chgrp {} {}", group, path)).await
}

/// Free space under `path` in KB.
pub async fn df_avail_kb(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
) -> Result<Option<u64>, SshError> {
    let out = exec
        .run(host, &format!("df -k --output=avail {}", path))
        .await?;

    if !out.success() {
        return Ok(None);
    }

    // First line is the "Avail" header.
    Ok(out
        .stdout
        .lines()
        .nth(1)
        .and_then(|l| l.trim().parse().ok()))
}

/// Lines of `file` matching `pattern`. `grep -c` exits 1 on zero matches,
/// which is a count, not a failure.
pub async fn grep_count(
    exec: &dyn RemoteExec,
    host: &str,
    pattern: &str,
    file: &str,
) -> Result<Option<u64>, SshError> {
    let out = exec
        .run(host, &format!("grep -c '{}' {}", pattern, file))
        .await?;

    if out.rc > 1 {
        return Ok(None);
    }

    Ok(out.stdout.trim().parse().ok())
}

pub async fn tar_create(
    exec: &dyn RemoteExec,
    host: &str,
    archive: &str,
    src: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("tar -czf {} -C {} .", archive, src))
        .await
}

pub async fn tar_extract(
    exec: &dyn RemoteExec,
    host: &str,
    archive: &str,
    dest: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("tar -xzf {} -C {}", archive, dest))
        .await
}

pub async fn rsync(
    exec: &dyn RemoteExec,
    host: &str,
    src: &str,
    dest: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("rsync -a {} {}", src, dest)).await
}

pub async fn path_exists(
    exec: &dyn RemoteExec,
    host: &str,
    path: &str,
) -> Result<bool, SshError> {
    Ok(exec.run(host, &format!("test -e {}", path)).await?.success())
}

pub async fn dir_exists(exec: &dyn RemoteExec, host: &str, path: &str) -> Result<bool, SshError> {
    Ok(exec.run(host, &format!("test -d {}", path)).await?.success())
}

pub async fn file_exists(exec: &dyn RemoteExec, host: &str, path: &str) -> Result<bool, SshError> {
    Ok(exec.run(host, &format!("test -f {}", path)).await?.success())
}

/// md5 of one file; the digest only, host path stripped.
pub async fn md5sum(
    exec: &dyn RemoteExec,
    host: &str,
    path: &Path,
) -> Result<Option<String>, SshError> {
    let out = exec
        .run(host, &format!("md5sum {}", path.display()))
        .await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(out
        .stdout
        .split_whitespace()
        .next()
        .map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_line_parses() {
        let stat = parse_stat_line("755 root root 4096 12345 2").unwrap();

        assert_eq!(stat.mode, 0o755);
        assert_eq!(stat.user, "root");
        assert_eq!(stat.size, 4096);
        assert_eq!(stat.inode, 12345);
        assert_eq!(stat.links, 2);
    }

    #[test]
    fn stat_line_rejects_garbage() {
        assert!(parse_stat_line("total 0").is_none());
        assert!(parse_stat_line("").is_none());
    }
}
