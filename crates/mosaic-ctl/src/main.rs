//! mosaic-ctl: command-line client for a Mosaic node.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpStream;

use mosaic_core::chunk::{file_info, DEFAULT_CHUNK_SIZE};
use mosaic_core::config::DEFAULT_PORT;
use mosaic_core::wire::{read_message, write_message};
use mosaic_core::{
    ChunkRequest, ContentHash, FileInfo, Message, Node, ReplicateRequest, SearchRequest,
};

const TIMEOUT: Duration = Duration::from_secs(30);

struct Options {
    node: Node,
    chunk_size: usize,
    json: bool,
}

// ── Node exchange ─────────────────────────────────────────────────────────────

async fn exchange(node: &Node, request: Message) -> Result<Message> {
    let round_trip = async {
        let mut stream = TcpStream::connect((node.host.as_str(), node.port))
            .await
            .with_context(|| format!("failed to connect to mosaicd at {node}, is it running?"))?;
        write_message(&mut stream, &request)
            .await
            .context("failed to send request")?;
        read_message(&mut stream)
            .await
            .context("failed to read reply")?
            .context("node closed the connection without replying")
    };
    tokio::time::timeout(TIMEOUT, round_trip)
        .await
        .with_context(|| format!("no reply from {node} within {TIMEOUT:?}"))?
}

fn describe(path: &Path, chunk_size: usize) -> Result<FileInfo> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("path has no UTF-8 file name")?;
    Ok(file_info(name, &data, chunk_size))
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

fn print_file(info: &FileInfo) {
    println!("  ┌─ {}", info.filename);
    println!("  │  hash   : {}", info.hash);
    println!("  │  size   : {} bytes", info.total_size());
    println!("  └─ chunks : {}", info.chunks.len());
}

fn cmd_info(opts: &Options, path: &str) -> Result<()> {
    let info = describe(Path::new(path), opts.chunk_size)?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    print_file(&info);
    for c in &info.chunks {
        println!("     [{:>4}] {:>8} bytes  {}", c.index, c.size, c.hash);
    }
    Ok(())
}

async fn cmd_replicate(opts: &Options, path: &str) -> Result<()> {
    let info = describe(Path::new(path), opts.chunk_size)?;
    let reply = exchange(&opts.node, ReplicateRequest { file_info: info }.into()).await?;
    let resp = match reply {
        Message::ReplicateResponse(resp) => resp,
        other => anyhow::bail!("unexpected reply: {:?}", other.kind()),
    };
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Replicate via {}", opts.node);
    println!("═══════════════════════════════════════");
    println!("  Status : {}", resp.status);
    if let Some(msg) = &resp.error_message {
        println!("  Error  : {msg}");
    }
    for s in &resp.node_statuses {
        let chunk = s
            .chunk_index
            .map(|i| format!("chunk {i}"))
            .unwrap_or_else(|| "-".into());
        print!("  {:<22} {:<10} {}", s.node.to_string(), chunk, s.status);
        match &s.error_message {
            Some(msg) => println!("  ({msg})"),
            None => println!(),
        }
    }
    Ok(())
}

async fn cmd_search(opts: &Options, pattern: &str) -> Result<()> {
    let reply = exchange(
        &opts.node,
        SearchRequest {
            regex: pattern.to_string(),
        }
        .into(),
    )
    .await?;
    let resp = match reply {
        Message::SearchResponse(resp) => resp,
        other => anyhow::bail!("unexpected reply: {:?}", other.kind()),
    };
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Search {pattern:?} via {}", opts.node);
    println!("═══════════════════════════════════════");
    println!("  Status : {}", resp.status);
    if let Some(msg) = &resp.error_message {
        println!("  Error  : {msg}");
    }
    for result in &resp.results {
        println!("\n  {} ({})", result.node, result.status);
        if let Some(msg) = &result.error_message {
            println!("    {msg}");
            continue;
        }
        if result.files.is_empty() {
            println!("    no matches");
        }
        for f in &result.files {
            println!("    {}  {}  {} bytes", f.hash.short(), f.filename, f.total_size());
        }
    }
    Ok(())
}

async fn cmd_chunk(opts: &Options, file_hash: &str, index: &str) -> Result<()> {
    let file_hash: ContentHash = file_hash.parse().context("file hash must be 32 hex digits")?;
    let chunk_index: u32 = index.parse().context("chunk index must be a number")?;
    let reply = exchange(
        &opts.node,
        ChunkRequest {
            file_hash,
            chunk_index,
            chunk_hash: None,
        }
        .into(),
    )
    .await?;
    let resp = match reply {
        Message::ChunkResponse(resp) => resp,
        other => anyhow::bail!("unexpected reply: {:?}", other.kind()),
    };
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("  {} chunk {} from {}", resp.status, resp.chunk_index, resp.node);
    match &resp.error_message {
        Some(msg) => println!("  {msg}"),
        None => println!("  {} bytes  {}", resp.data.len(), hex::encode(&resp.data[..resp.data.len().min(32)])),
    }
    Ok(())
}

fn print_usage() {
    println!("Usage: mosaic-ctl [--node <host:port>] [--chunk-size <n>] [--json] <command>");
    println!();
    println!("Commands:");
    println!("  info <path>              Show the chunk layout of a local file");
    println!("  replicate <path>         Ask the node to replicate a file from its peers");
    println!("  search <pattern>         Search filenames on the node and its peers");
    println!("  chunk <file-hash> <n>    Fetch one chunk from the node");
    println!();
    println!("Options:");
    println!("  --node <host:port>   Target node (default: 127.0.0.1:{})", DEFAULT_PORT);
    println!("  --chunk-size <n>     Chunk size for info/replicate (default: {})", DEFAULT_CHUNK_SIZE);
    println!("  --json               Print raw replies as JSON");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut opts = Options {
        node: Node::new("127.0.0.1", DEFAULT_PORT),
        chunk_size: DEFAULT_CHUNK_SIZE,
        json: false,
    };
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--node" => {
                i += 1;
                opts.node = args
                    .get(i)
                    .context("--node requires a value")?
                    .parse()
                    .context("--node must be host:port")?;
            }
            "--chunk-size" => {
                i += 1;
                opts.chunk_size = args
                    .get(i)
                    .context("--chunk-size requires a value")?
                    .parse()
                    .context("--chunk-size must be a number")?;
                if opts.chunk_size == 0 {
                    anyhow::bail!("--chunk-size must be at least 1");
                }
            }
            "--json" => opts.json = true,
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["info", path]                 => cmd_info(&opts, path),
        ["replicate", path]            => cmd_replicate(&opts, path).await,
        ["search", pattern]            => cmd_search(&opts, pattern).await,
        ["chunk", hash, index]         => cmd_chunk(&opts, hash, index).await,
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
