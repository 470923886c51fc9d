use std::fs::Metadata;

/// Render an `ls`-style mode string such as `-rw-r--r--` or `drwxr-xr-x`.
///
/// Type letters are emitted in a fixed order: `d` directory, `L` symlink,
/// `D` device, `p` fifo, `S` socket, `u` setuid, `g` setgid, `c` character
/// device, `t` sticky. A plain file gets a single `-`.
#[cfg(unix)]
pub fn mode_string(metadata: &Metadata) -> String {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    let file_type = metadata.file_type();
    let mode = metadata.permissions().mode();
    let mut out = String::with_capacity(12);

    if file_type.is_dir() {
        out.push('d');
    }
    if file_type.is_symlink() {
        out.push('L');
    }
    if file_type.is_block_device() || file_type.is_char_device() {
        out.push('D');
    }
    if file_type.is_fifo() {
        out.push('p');
    }
    if file_type.is_socket() {
        out.push('S');
    }
    if mode & 0o4000 != 0 {
        out.push('u');
    }
    if mode & 0o2000 != 0 {
        out.push('g');
    }
    if file_type.is_char_device() {
        out.push('c');
    }
    if mode & 0o1000 != 0 {
        out.push('t');
    }
    if out.is_empty() {
        out.push('-');
    }

    push_permission_bits(&mut out, mode);
    out
}

#[cfg(not(unix))]
pub fn mode_string(metadata: &Metadata) -> String {
    let file_type = metadata.file_type();
    let mut out = String::with_capacity(10);

    // No permission bits here; derive them from the read-only flag.
    let mut perm = if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    };
    if file_type.is_dir() {
        out.push('d');
        perm |= 0o111;
    } else if file_type.is_symlink() {
        out.push('L');
    } else {
        out.push('-');
    }

    push_permission_bits(&mut out, perm);
    out
}

fn push_permission_bits(out: &mut String, mode: u32) {
    const RWX: &[u8; 9] = b"rwxrwxrwx";
    for (i, flag) in RWX.iter().enumerate() {
        if mode & (1 << (8 - i)) != 0 {
            out.push(*flag as char);
        } else {
            out.push('-');
        }
    }
}
