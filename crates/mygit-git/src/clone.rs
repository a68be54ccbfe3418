//! Smart HTTP clone driver.
//!
//! Ref discovery over `GET /info/refs?service=git-upload-pack`, a minimal
//! `want`/`done` upload-pack request, then unpack, branch creation and
//! checkout. See: https://git-scm.com/docs/http-protocol

use crate::pack::PackParser;
use crate::pktline::{PktLine, PktLineReader};
use crate::{GitError, Result};
use mygit_storage::{ObjectId, Repository};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The HEAD advertised by a remote: its commit and the matching branch.
#[derive(Debug)]
struct AdvertisedHead {
    id: ObjectId,
    branch: String,
}

/// Clones `url` into `dir`: discovers HEAD, fetches a pack for it, unpacks
/// into a fresh repository, then creates and checks out the branch.
///
/// On failure after the target directory was created it is left on disk
/// for inspection.
pub fn clone(url: &str, dir: &Path) -> Result<()> {
    let remote = url.trim_end_matches('/');
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()?;

    let head = discover_head(&client, remote)?;
    tracing::info!(commit = %head.id, branch = %head.branch, "discovered remote HEAD");

    let pack_body = fetch_pack(&client, remote, &head.id)?;

    std::fs::create_dir_all(dir)?;
    let repo = Repository::init(dir, false)?;

    // The response leads with a NAK pkt-line; everything after it is pack.
    let mut reader = PktLineReader::new(Cursor::new(pack_body.as_slice()));
    reader.read()?;
    let pack_start = reader.into_inner().position() as usize;
    let ids = PackParser::new(&pack_body[pack_start..]).unpack(&repo.objects)?;
    tracing::info!(objects = ids.len(), "unpacked remote objects");

    repo.make_branch(&head.branch, &head.id)?;
    repo.checkout(&head.branch)?;
    Ok(())
}

/// Performs ref discovery and matches the advertised HEAD to a branch.
fn discover_head(client: &reqwest::blocking::Client, remote: &str) -> Result<AdvertisedHead> {
    let response = client
        .get(format!("{remote}/info/refs?service={UPLOAD_PACK_SERVICE}"))
        .send()?;
    if response.status() != 200 {
        return Err(GitError::Protocol(format!(
            "ref discovery returned HTTP {}",
            response.status()
        )));
    }

    let body = response.bytes()?;
    let mut reader = PktLineReader::new(Cursor::new(body.as_ref()));
    // Skip the "# service=git-upload-pack" section.
    reader.drain_until_flush()?;

    let head_line = match reader.read()? {
        PktLine::Data(data) => data,
        PktLine::Flush => {
            return Err(GitError::Protocol("empty ref advertisement".to_string()))
        }
    };
    // Capabilities follow the first NUL and are not negotiated.
    let head_ref = head_line.split(|&b| b == 0).next().unwrap_or(&head_line);
    let head_ref = std::str::from_utf8(head_ref)
        .map_err(|_| GitError::Protocol("non-utf8 ref advertisement".to_string()))?;
    let (head_hex, ref_name) = head_ref
        .split_once(' ')
        .ok_or_else(|| GitError::Protocol(format!("invalid ref line: {head_ref}")))?;
    if ref_name.trim_end() != "HEAD" {
        return Err(GitError::Protocol(format!(
            "expected HEAD advertisement, got {ref_name}"
        )));
    }
    let id = ObjectId::from_hex(head_hex)?;

    // The branch HEAD points at is the ref advertising the same digest.
    let mut branch = None;
    loop {
        match reader.read()? {
            PktLine::Flush => break,
            PktLine::Data(data) => {
                let line = std::str::from_utf8(&data)
                    .map_err(|_| GitError::Protocol("non-utf8 ref advertisement".to_string()))?;
                let line = line.trim_end_matches('\n');
                if let Some((hex, name)) = line.split_once(' ') {
                    if hex == head_hex {
                        if let Some(name) = name.strip_prefix("refs/heads/") {
                            branch = Some(name.to_string());
                        }
                    }
                }
            }
        }
    }

    let branch = branch.ok_or_else(|| {
        GitError::Protocol("no branch matches the advertised HEAD".to_string())
    })?;
    Ok(AdvertisedHead { id, branch })
}

/// Requests a pack containing everything reachable from `want`.
fn fetch_pack(
    client: &reqwest::blocking::Client,
    remote: &str,
    want: &ObjectId,
) -> Result<Vec<u8>> {
    let mut request = Vec::new();
    request.extend(PktLine::Data(format!("want {want}\n").into_bytes()).encode());
    request.extend(PktLine::Flush.encode());
    request.extend(PktLine::Data(b"done\n".to_vec()).encode());

    let response = client
        .post(format!("{remote}/{UPLOAD_PACK_SERVICE}?service={UPLOAD_PACK_SERVICE}"))
        .header("Content-Type", "application/x-git-upload-pack-request")
        .body(request)
        .send()?;
    if response.status() != 200 {
        return Err(GitError::Protocol(format!(
            "upload-pack returned HTTP {}",
            response.status()
        )));
    }
    Ok(response.bytes()?.to_vec())
}
