// SPDX-License-Identifier: MIT

//! `quarry debug` — protocol and selection debugging helpers.

use crate::cli::{DebugArgs, DebugTool};
use crate::config::FileConfig;
use anyhow::{anyhow, Result};
use quarry_core::JobId;
use quarry_runtime::{ProxySelector, SelectionCtx};
use quarry_wire::{decode_frame, read_frame_blocking, Frame};
use std::io::Read;

pub fn execute(args: DebugArgs) -> Result<()> {
    match args.tool {
        DebugTool::ResolveProxy { config, pool, commit, job_id, sticky_key } => {
            let file = FileConfig::load(&config)?;
            let selector = ProxySelector::new();
            let mut found = false;
            for p in file.proxy_pools {
                p.validate()?;
                if p.name == pool {
                    found = true;
                }
                selector.add_pool(p);
            }
            if !found {
                return Err(anyhow!("pool {pool:?} not defined in the config file"));
            }

            let job_id = job_id.map(JobId::from_string);
            let ctx = SelectionCtx {
                sticky_key: sticky_key.as_deref(),
                job_id: job_id.as_ref(),
                scheme: None,
                host: None,
                port: None,
            };
            let endpoint = if commit {
                selector.select(&pool, &ctx)?
            } else {
                selector.peek(&pool, &ctx)?
            };
            // Redacted: never print credentials.
            println!("{}", endpoint.redacted().server_arg());
            Ok(())
        }
        DebugTool::Ipc { input } => {
            let mut reader: Box<dyn Read> = if input == "-" {
                Box::new(std::io::stdin().lock())
            } else {
                Box::new(std::fs::File::open(&input)?)
            };

            let mut index = 0usize;
            loop {
                let payload = match read_frame_blocking(&mut reader) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => break,
                    Err(err) => {
                        println!("frame {index}: FATAL {err}");
                        break;
                    }
                };
                match decode_frame(&payload) {
                    Ok(Frame::Event(envelope)) => {
                        println!(
                            "frame {index}: event {} ({} bytes)",
                            envelope.log_summary(),
                            payload.len()
                        );
                    }
                    Ok(Frame::Chunk(chunk)) => {
                        println!(
                            "frame {index}: artifact_chunk {} seq={} len={} is_last={}",
                            chunk.artifact_id,
                            chunk.seq,
                            chunk.data.len(),
                            chunk.is_last
                        );
                    }
                    Ok(Frame::FileWrite(fw)) => {
                        println!(
                            "frame {index}: file_write {} ({} bytes)",
                            fw.path,
                            fw.data.len()
                        );
                    }
                    Ok(Frame::RunResult(result)) => {
                        println!("frame {index}: run_result {}", result.outcome.status);
                    }
                    Err(err) => {
                        println!("frame {index}: DECODE ERROR {err}");
                        break;
                    }
                }
                index += 1;
            }
            Ok(())
        }
    }
}
