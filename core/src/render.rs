//! Peer blob decoding and WireGuard configuration rendering

use crate::model::{ConfigSnapshot, Peer};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::debug;
use std::fs;
use std::path::Path;

/// Mode for the rendered config: readable by the service group, nobody else
pub const CONFIG_MODE: u32 = 0o660;

/// Decode the base64 YAML peer blob into peer records.
///
/// An empty or whitespace-only blob means no peers. Decode or parse failures
/// are fatal configuration errors: bad input needs operator correction, not
/// a retry.
pub fn decode_peers(blob: &str) -> Result<Vec<Peer>> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    let raw = BASE64
        .decode(blob)
        .map_err(|e| Error::peer_data(format!("peers is not valid base64: {}", e)))?;
    let peers: Option<Vec<Peer>> = serde_yaml::from_slice(&raw)
        .map_err(|e| Error::peer_data(format!("peers is not a valid YAML sequence: {}", e)))?;
    Ok(peers.unwrap_or_default())
}

/// Build the full config file content for the snapshot.
///
/// The result always replaces the previous file wholesale; peers removed
/// from the snapshot leave no residue.
pub fn render_config(snapshot: &ConfigSnapshot, private_key: &str, peers: &[Peer]) -> String {
    let mut lines = Vec::new();

    lines.push("[Interface]".to_string());
    lines.push(format!("Address = {}", snapshot.address));
    lines.push(format!("ListenPort = {}", snapshot.listen_port));
    lines.push(format!("PrivateKey = {}", private_key));
    if snapshot.forward_ip {
        let dev = &snapshot.forward_dev;
        lines.push(format!(
            "PostUp = iptables -A FORWARD -i %i -j ACCEPT; iptables -A FORWARD -o %i -j ACCEPT; iptables -t nat -A POSTROUTING -o {} -j MASQUERADE",
            dev
        ));
        lines.push(format!(
            "PostDown = iptables -D FORWARD -i %i -j ACCEPT; iptables -D FORWARD -o %i -j ACCEPT; iptables -t nat -D POSTROUTING -o {} -j MASQUERADE",
            dev
        ));
    }

    for peer in peers {
        lines.push(String::new());
        lines.push("[Peer]".to_string());
        lines.push(format!("PublicKey = {}", peer.public_key));
        lines.push(format!("AllowedIPs = {}", peer.allowed_ips));
        if let Some(endpoint) = &peer.endpoint {
            lines.push(format!("Endpoint = {}", endpoint));
        }
        if let Some(keepalive) = peer.persistent_keepalive {
            lines.push(format!("PersistentKeepalive = {}", keepalive));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

/// Write the config to `path` with mode 0660, replacing any previous file.
///
/// The content lands in a temp file first and is renamed into place, so the
/// service never observes a half-written config.
pub fn write_config(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&tmp)?.permissions();
        perms.set_mode(CONFIG_MODE);
        fs::set_permissions(&tmp, perms)?;
    }

    fs::rename(&tmp, path)?;
    debug!("wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
