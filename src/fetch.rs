//! Byte-stream fetching over HTTP.
//!
//! The engine only sees the [`ByteFetcher`] trait; [`UreqFetcher`] is the
//! production implementation on a blocking client, which fits the pool
//! workers (plain threads, no async runtime). Timeouts and transport
//! behavior live entirely in the fetcher; the engine never retries.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{LoadError, LoadResult};

/// External byte-stream fetcher.
pub trait ByteFetcher: Send + Sync {
    /// Stream `url` into `dest`, reporting rough percent progress. The file
    /// must only appear at `dest` once the download is complete.
    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &dyn Fn(u8)) -> LoadResult<()>;

    /// Fetch `url` fully into memory.
    fn fetch_to_memory(&self, url: &str) -> LoadResult<Bytes>;
}

/// Blocking HTTP fetcher.
pub struct UreqFetcher {
    agent: ureq::Agent,
}

const COPY_BUF_SIZE: usize = 8 * 1024;

impl UreqFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
        }
    }

    fn open(&self, url: &str) -> LoadResult<ureq::Response> {
        self.agent.get(url).call().map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteFetcher for UreqFetcher {
    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &dyn Fn(u8)) -> LoadResult<()> {
        let response = self.open(url)?;
        let total: Option<u64> = response
            .header("Content-Length")
            .and_then(|v| v.parse().ok());

        // Stream into a sibling temp file, then rename into place so a
        // half-written download is never mistaken for a cached file.
        let tmp = dest.with_extension("part");
        let mut out = File::create(&tmp)?;
        let mut reader = response.into_reader();
        let mut buf = [0u8; COPY_BUF_SIZE];
        let mut copied: u64 = 0;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    drop(out);
                    let _ = std::fs::remove_file(&tmp);
                    return Err(LoadError::Io(e));
                }
            };
            if let Err(e) = out.write_all(&buf[..n]) {
                drop(out);
                let _ = std::fs::remove_file(&tmp);
                return Err(LoadError::Io(e));
            }
            copied += n as u64;
            if let Some(total) = total.filter(|t| *t > 0) {
                progress((copied * 100 / total).min(100) as u8);
            }
        }

        out.flush()?;
        drop(out);
        std::fs::rename(&tmp, dest)?;
        Ok(())
    }

    fn fetch_to_memory(&self, url: &str) -> LoadResult<Bytes> {
        let response = self.open(url)?;
        let mut data = Vec::new();
        response.into_reader().read_to_end(&mut data)?;
        Ok(Bytes::from(data))
    }
}
