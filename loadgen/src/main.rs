use std::time::{Duration, Instant};

use common::config::{parse_host_list, HostPort};
use coordinator::Session;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod workload;

use workload::{Workload, WorkloadKind};

const VALUE_SIZE: usize = 128;
const BATCH_SIZE: usize = 1024;
const MAX_RETRIES: u32 = 100;
const MAX_BACKOFF: Duration = Duration::from_millis(100);
const PAYMENT_CLIENTS: usize = 10;
const ACCOUNTS: usize = 10;

struct Flags {
    hosts: Vec<HostPort>,
    theta: f64,
    workload: WorkloadKind,
    secs: u64,
}

fn parse_flags(args: &[String]) -> Result<Flags, String> {
    let mut flags = Flags {
        hosts: vec![HostPort::default_local()],
        theta: 0.99,
        workload: WorkloadKind::YcsbB,
        secs: 30,
    };
    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        i += 1;
        let value = args.get(i).ok_or_else(|| format!("missing value for {flag}"))?;
        match flag {
            "-hosts" => flags.hosts = parse_host_list(value)?,
            "-theta" => flags.theta = value.parse().map_err(|e| format!("invalid -theta: {e}"))?,
            "-workload" => flags.workload = value.parse()?,
            "-secs" => flags.secs = value.parse().map_err(|e| format!("invalid -secs: {e}"))?,
            other => return Err(format!("unknown flag {other:?}")),
        }
        i += 1;
    }
    Ok(flags)
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = Duration::from_millis(1 << attempt.min(7));
    exp.min(MAX_BACKOFF)
}

/// Runs the three-operation YCSB-style transaction loop for one client,
/// retrying each transaction on conflict until it commits or the retry cap
/// is exhausted. Returns the number of transactions completed.
async fn run_client(
    id: usize,
    hosts: Vec<HostPort>,
    kind: WorkloadKind,
    theta: f64,
    done: CancellationToken,
) -> u64 {
    let mut session = Session::new(hosts);
    let mut workload = Workload::new(kind, theta);
    let value = "x".repeat(VALUE_SIZE);
    let mut completed = 0u64;

    while !done.is_cancelled() {
        for _ in 0..BATCH_SIZE {
            // The operations are fixed up front so a retry replays the same
            // transaction rather than sampling a fresh one.
            let ops: Vec<workload::WorkloadOp> = (0..3).map(|_| workload.next()).collect();

            let mut retries = 0u32;
            loop {
                retries += 1;
                if session.begin().is_err() {
                    continue;
                }

                let mut ok = true;
                for op in &ops {
                    let key = op.key.to_string();
                    let result = if op.is_read {
                        session.get(&key).await.map(|_| ())
                    } else {
                        session.put(&key, &value).await
                    };
                    if let Err(e) = result {
                        debug!("client {id}: operation on {key} failed: {e}");
                        ok = false;
                        break;
                    }
                }

                if ok {
                    if session.commit().await.is_ok() {
                        break;
                    }
                } else {
                    let _ = session.abort().await;
                    tokio::time::sleep(backoff_for_attempt(retries)).await;
                }

                if retries >= MAX_RETRIES {
                    // Not expected unless the system is overloaded.
                    warn!("client {id}: giving up on transaction after {MAX_RETRIES} retries");
                    break;
                }
            }

            completed += 1;
        }
    }

    info!("client {id} finished operations");
    completed
}

async fn initialize_accounts(session: &mut Session) {
    if session.begin().is_err() {
        return;
    }
    for i in 0..ACCOUNTS {
        let _ = session.put(&format!("account_{i}"), "1000").await;
    }
    let _ = session.put("initialized", "true").await;
    let _ = session.commit().await;
}

async fn wait_for_initialization(session: &mut Session) {
    loop {
        if session.begin().is_err() {
            continue;
        }
        let initialized = session.get("initialized").await;
        let committed = session.commit().await;
        if let (Ok(value), Ok(())) = (initialized, committed) {
            if value == "true" {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn parse_balance(raw: &str) -> i64 {
    if raw.is_empty() {
        1000
    } else {
        raw.parse().unwrap_or(1000)
    }
}

/// One payment client: transfers 100 from its own account to the next one in
/// the ring, then audits all balances in a second transaction. Returns the
/// number of transfers committed.
async fn run_payment_client(id: usize, hosts: Vec<HostPort>, done: CancellationToken) -> u64 {
    let mut session = Session::new(hosts);

    if id == 0 {
        initialize_accounts(&mut session).await;
    } else {
        wait_for_initialization(&mut session).await;
    }

    info!("payment client {id} starting");
    let mut completed = 0u64;

    while !done.is_cancelled() {
        if session.begin().is_err() {
            continue;
        }

        let src = id % ACCOUNTS;
        let dst = (id + 1) % ACCOUNTS;

        let src_balance = match session.get(&format!("account_{src}")).await {
            Ok(raw) => parse_balance(&raw),
            Err(_) => {
                let _ = session.abort().await;
                continue;
            }
        };
        if src_balance < 100 {
            let _ = session.abort().await;
            continue;
        }
        if session
            .put(&format!("account_{src}"), &(src_balance - 100).to_string())
            .await
            .is_err()
        {
            let _ = session.abort().await;
            continue;
        }
        let dst_balance = match session.get(&format!("account_{dst}")).await {
            Ok(raw) => parse_balance(&raw),
            Err(_) => {
                let _ = session.abort().await;
                continue;
            }
        };
        if session
            .put(&format!("account_{dst}"), &(dst_balance + 100).to_string())
            .await
            .is_err()
        {
            let _ = session.abort().await;
            continue;
        }
        if session.commit().await.is_err() {
            continue;
        }

        completed += 1;

        // Balance audit. The read locks taken across all accounts make the
        // snapshot consistent, so the total must be conserved.
        if session.begin().is_err() {
            continue;
        }
        let mut balances = Vec::with_capacity(ACCOUNTS);
        let mut audit_ok = true;
        for i in 0..ACCOUNTS {
            match session.get(&format!("account_{i}")).await {
                Ok(raw) => balances.push(parse_balance(&raw)),
                Err(_) => {
                    let _ = session.abort().await;
                    audit_ok = false;
                    break;
                }
            }
        }
        if !audit_ok {
            continue;
        }
        for (i, balance) in balances.iter().enumerate() {
            if *balance < 0 {
                error!("account_{i} has negative balance {balance}");
            }
        }
        let total: i64 = balances.iter().sum();
        if total != 10_000 {
            error!("total balance is {total}, expected 10000");
        }
        let _ = session.commit().await;
    }

    info!("payment client {id} finished operations");
    completed
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let flags = match parse_flags(&args) {
        Ok(flags) => flags,
        Err(e) => {
            eprintln!("{e}");
            eprintln!(
                "usage: loadgen [-hosts h:p,...] [-theta <f>] [-workload YCSB-A|YCSB-B|YCSB-C|xfer] [-secs <n>]"
            );
            std::process::exit(2);
        }
    };

    info!(
        "hosts {:?} theta {:.2} workload {:?} secs {}",
        flags.hosts.iter().map(HostPort::to_string).collect::<Vec<_>>(),
        flags.theta,
        flags.workload,
        flags.secs,
    );

    let start = Instant::now();
    let done = CancellationToken::new();
    let mut clients = Vec::new();

    if flags.workload == WorkloadKind::Transfer {
        for id in 0..PAYMENT_CLIENTS {
            clients.push(tokio::spawn(run_payment_client(
                id,
                flags.hosts.clone(),
                done.clone(),
            )));
        }
    } else {
        clients.push(tokio::spawn(run_client(
            0,
            flags.hosts.clone(),
            flags.workload,
            flags.theta,
            done.clone(),
        )));
    }

    tokio::time::sleep(Duration::from_secs(flags.secs)).await;
    done.cancel();

    let mut completed = 0u64;
    for client in clients {
        completed += client.await.unwrap_or(0);
    }

    let elapsed = start.elapsed();
    println!(
        "throughput {:.2} ops/s",
        completed as f64 / elapsed.as_secs_f64()
    );
}
