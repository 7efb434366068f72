//! Lockless Pipe Demo - producer/consumer throughput run
//!
//! Satu thread writer mem-push N record, satu thread reader mem-pop dan
//! memeriksa urutannya, lalu state pipe di-validate dan di-dump.
//!
//! Usage:
//!   cargo run --release --bin pipe_demo -- [OPTIONS]
//!   RUST_LOG=debug cargo run --bin pipe_demo -- --policy condvar

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use lockless_pipe::{
    CondvarWakeup, LocklessPipe, PipeConfig, PipeError, Reader, SleepWakeup, WakeupPolicy, Writer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyKind {
    Sleep,
    Condvar,
}

impl PolicyKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sleep" => Some(Self::Sleep),
            "condvar" => Some(Self::Condvar),
            _ => None,
        }
    }
}

/// Demo configuration
struct DemoConfig {
    pipe: PipeConfig,
    records: u64,
    record_size: usize,
    policy: PolicyKind,
    shm_path: Option<PathBuf>,
}

impl DemoConfig {
    fn from_env() -> Self {
        let pipe = PipeConfig::from_env().unwrap_or_else(|e| {
            eprintln!("⚠️  Ignoring environment: {}", e);
            PipeConfig::default()
        });

        Self {
            pipe,
            records: 1_000_000,
            record_size: 64,
            policy: PolicyKind::Sleep,
            shm_path: None,
        }
    }
}

/// Hasil satu run
struct DemoStats {
    records: u64,
    bytes: u64,
    elapsed: Duration,
    failed_writes: u64,
}

impl DemoStats {
    fn print(&self) {
        let secs = self.elapsed.as_secs_f64();
        let ns_per_record = self.elapsed.as_nanos() as f64 / self.records.max(1) as f64;

        println!("\n📊 Pipe Throughput");
        println!("   Records:        {}", self.records);
        println!("   Elapsed:        {:.3}s", secs);
        println!("   Latency:        {:.2} ns/record", ns_per_record);
        println!("   Throughput:     {:.2} M records/sec", self.records as f64 / secs / 1_000_000.0);
        println!("   Bandwidth:      {:.2} MB/sec", self.bytes as f64 / secs / 1_000_000.0);
        println!("   Failed writes:  {}", self.failed_writes);
    }
}

fn parse_args() -> DemoConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DemoConfig::from_env();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--capacity" | "-c" => {
                if i + 1 < args.len() {
                    config.pipe.capacity = args[i + 1].parse().unwrap_or(config.pipe.capacity);
                    i += 1;
                }
            }
            "--records" | "-n" => {
                if i + 1 < args.len() {
                    config.records = args[i + 1].parse().unwrap_or(config.records);
                    i += 1;
                }
            }
            "--size" | "-s" => {
                if i + 1 < args.len() {
                    config.record_size = args[i + 1].parse().unwrap_or(config.record_size);
                    i += 1;
                }
            }
            "--policy" | "-p" => {
                if i + 1 < args.len() {
                    config.policy = PolicyKind::parse(&args[i + 1]).unwrap_or_else(|| {
                        eprintln!("⚠️  Unknown policy {:?}, using sleep", args[i + 1]);
                        PolicyKind::Sleep
                    });
                    i += 1;
                }
            }
            "--shm" => {
                if i + 1 < args.len() {
                    config.shm_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Lockless Pipe Demo - SPSC throughput run\n");
                println!("Usage: pipe_demo [OPTIONS]\n");
                println!("Options:");
                println!("  -c, --capacity <BYTES>  Ring capacity (default: 65536)");
                println!("  -n, --records <N>       Records to push (default: 1000000)");
                println!("  -s, --size <BYTES>      Record payload size (default: 64)");
                println!("  -p, --policy <NAME>     sleep | condvar (default: sleep)");
                println!("      --shm <PATH>        Back the pipe with a mapped file");
                println!("  -h, --help              Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

/// Record berisi nomor urut di 8 byte pertama (kalau muat), sisanya pola
fn fill_record(buf: &mut [u8], seq: u64) {
    let tag = seq.to_le_bytes();
    let n = buf.len().min(tag.len());
    buf[..n].copy_from_slice(&tag[..n]);
    for (i, b) in buf[n..].iter_mut().enumerate() {
        *b = (seq as u8).wrapping_add(i as u8);
    }
}

fn record_seq(record: &[u8]) -> u64 {
    let mut tag = [0u8; 8];
    let n = record.len().min(tag.len());
    tag[..n].copy_from_slice(&record[..n]);
    u64::from_le_bytes(tag)
}

fn run<W: WakeupPolicy + 'static>(
    mut writer: Writer<W>,
    mut reader: Reader<W>,
    records: u64,
    record_size: usize,
) -> Result<DemoStats, PipeError> {
    let max = writer.pipe().max_record_size() as usize;
    if record_size > max {
        return Err(PipeError::RecordTooLarge { len: record_size, max: max as u32 });
    }
    let mask = if record_size >= 8 { u64::MAX } else { (1u64 << (record_size * 8)).wrapping_sub(1) };

    let start = Instant::now();

    let producer = thread::spawn(move || -> Result<Writer<W>, PipeError> {
        for seq in 0..records {
            let mut slot = writer.reserve(record_size)?;
            fill_record(&mut slot, seq);
            slot.commit();
        }
        Ok(writer)
    });

    let mut buf = vec![0u8; max];
    let mut out_of_order = 0u64;
    for seq in 0..records {
        let record = match reader.pop(&mut buf) {
            Ok(record) => record,
            Err(e) => {
                // Writer bisa sedang menunggu ring penuh
                reader.pipe().stop_writer();
                return Err(e);
            }
        };
        if record.len() != record_size || record_seq(record) != seq & mask {
            out_of_order += 1;
        }
    }
    let elapsed = start.elapsed();

    let writer = match producer.join() {
        Ok(result) => result?,
        Err(_) => return Err(PipeError::Corrupted("producer thread panicked".to_string())),
    };

    if out_of_order > 0 {
        warn!(out_of_order, "records arrived out of order");
    }

    let pipe = writer.pipe();
    if !pipe.validate(true) {
        return Err(PipeError::Corrupted("validation failed after run".to_string()));
    }
    println!("\n🔍 Pipe state after run:\n{}", pipe.describe());

    Ok(DemoStats {
        records,
        bytes: records * record_size as u64,
        elapsed,
        failed_writes: pipe.num_failed_writes(),
    })
}

fn run_demo(config: DemoConfig) -> Result<DemoStats, PipeError> {
    info!(
        capacity = config.pipe.capacity,
        records = config.records,
        record_size = config.record_size,
        policy = ?config.policy,
        shm = ?config.shm_path,
        "starting pipe demo"
    );

    match (&config.shm_path, config.policy) {
        (Some(path), kind) => {
            if kind == PolicyKind::Condvar {
                warn!("condvar wakeup does not cross mappings, using sleep policy");
            }
            let policy = SleepWakeup::default();
            let writer = Writer::create_mapped(path, &config.pipe, policy)?;
            let reader = Reader::attach_mapped(path, policy)?;
            let stats = run(writer, reader, config.records, config.record_size);
            std::fs::remove_file(path).ok();
            stats
        }
        (None, PolicyKind::Sleep) => {
            let pipe = LocklessPipe::with_policy(&config.pipe, SleepWakeup::default())?;
            let (writer, reader) = pipe.split();
            run(writer, reader, config.records, config.record_size)
        }
        (None, PolicyKind::Condvar) => {
            let pipe = LocklessPipe::with_policy(&config.pipe, CondvarWakeup::default())?;
            let (writer, reader) = pipe.split();
            run(writer, reader, config.records, config.record_size)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🚀 Lockless Pipe Demo");
    println!("=====================\n");

    let config = parse_args();
    match run_demo(config) {
        Ok(stats) => {
            stats.print();
            println!("\n✅ Demo complete!");
        }
        Err(e) => {
            eprintln!("❌ Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_names() {
        assert_eq!(PolicyKind::parse("sleep"), Some(PolicyKind::Sleep));
        assert_eq!(PolicyKind::parse("condvar"), Some(PolicyKind::Condvar));
        assert_eq!(PolicyKind::parse("futex"), None);
        assert_eq!(PolicyKind::parse(""), None);
    }

    #[test]
    fn test_record_sequence_tag() {
        let mut buf = [0u8; 16];
        fill_record(&mut buf, 0x0102_0304);
        assert_eq!(record_seq(&buf), 0x0102_0304);

        // Record pendek hanya membawa byte rendah nomor urut
        let mut short = [0u8; 2];
        fill_record(&mut short, 0x0102_0304);
        assert_eq!(record_seq(&short), 0x0304);
    }
}
