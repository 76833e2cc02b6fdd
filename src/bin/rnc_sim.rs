//! Sparse-coding benchmark CLI.
//!
//! `rnc-sim INPUT N A T R F ID`
//!
//! Starting from the `N` unit blocks the source adapter derives from
//! `INPUT`, replenishes a coded pool to `R` blocks, then for up to
//! `maxsteps = 50` rounds: drops blocks from the pool with per-block
//! probability `F`, and replenishes back toward `R` whenever the pool's
//! count falls to or below threshold `T`. Emits one `RESULT` line:
//!
//! `RESULT id file q N A T R F dead_at wasted[;...] blockcount[;...] replenished[;...]`
//!
//! `dead_at` is the step at which the pool fell below `N` recoverable
//! blocks (unrecoverable), or `NULL` if it survived all `maxsteps`. Per-step
//! arrays hold exactly `maxsteps` semicolon-joined entries; entries at or
//! past `dead_at` are printed as `NULL`.

#![forbid(unsafe_code)]

use std::env;
use std::fs;

use rlncore::block::BlockList;
use rlncore::prng::{Mt19937, Prng};
use rlncore::sim;
use rlncore::source::Source;

const MAXSTEPS: usize = 50;

fn usage() -> ! {
    eprintln!("usage: rnc-sim INPUT N A T R F ID");
    std::process::exit(2);
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "rnc_sim=info".into()))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 8 {
        usage();
    }
    let input = &args[1];
    let n: usize = args[2].parse().map_err(|_| anyhow::anyhow!("N must be a positive integer"))?;
    let a: f64 = args[3].parse().map_err(|_| anyhow::anyhow!("A must be a real number"))?;
    let t: usize = args[4].parse().map_err(|_| anyhow::anyhow!("T must be a non-negative integer"))?;
    let r: usize = args[5].parse().map_err(|_| anyhow::anyhow!("R must be a non-negative integer"))?;
    let f: f64 = args[6].parse().map_err(|_| anyhow::anyhow!("F must be a real number in [0,1)"))?;
    let id = &args[7];

    let bytes = fs::read(input).map_err(|e| anyhow::anyhow!("read {input}: {e}"))?;
    let source = Source::from_bytes(&bytes, n)?;
    let base = source.initial_blocks();

    let mut rng = Mt19937::from_seed(1);

    let mut pool = BlockList::with_capacity(r);
    sim::replenish(&base, &mut pool, n, n, r, a, &mut rng)?;

    let mut dead_at: Option<usize> = None;
    let mut wasted_steps = vec![None; MAXSTEPS];
    let mut blockcount_steps = vec![None; MAXSTEPS];
    let mut replenished_steps = vec![None; MAXSTEPS];

    for step in 0..MAXSTEPS {
        if dead_at.is_some() {
            break;
        }
        pool.random_drop_p(f, pool.count(), &mut rng);

        if pool.count() < n {
            dead_at = Some(step);
            blockcount_steps[step] = Some(pool.count());
            wasted_steps[step] = Some(0);
            replenished_steps[step] = Some(0);
            break;
        }

        let before = pool.count();
        if pool.count() <= t {
            let src = pool.shallow_copy();
            sim::replenish(&src, &mut pool, n, t, r, a, &mut rng)?;
        }
        let added = pool.count() - before;

        let (_, wasted) = sim::gather_working_set(&pool, n, &mut rng)?;
        wasted_steps[step] = Some(wasted);
        blockcount_steps[step] = Some(pool.count());
        replenished_steps[step] = Some(added);
    }

    let q = rlncore::field::Q;
    let render = |steps: &[Option<usize>]| -> String {
        steps
            .iter()
            .enumerate()
            .map(|(i, v)| match (dead_at, v) {
                (Some(d), _) if i >= d && Some(i) != dead_at => "NULL".to_string(),
                (_, Some(x)) => x.to_string(),
                (_, None) => "NULL".to_string(),
            })
            .collect::<Vec<_>>()
            .join(";")
    };

    println!(
        "RESULT {id} {input} {q} {n} {a} {t} {r} {f} {} {} {} {}",
        dead_at.map(|d| d.to_string()).unwrap_or_else(|| "NULL".to_string()),
        render(&wasted_steps),
        render(&blockcount_steps),
        render(&replenished_steps),
    );

    Ok(())
}
