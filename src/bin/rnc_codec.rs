//! Encoder/decoder benchmark CLI.
//!
//! `rnc-codec INPUT N NCPUS BLOCK_SIZE {c|d} ID`
//!
//! - `c`: load INPUT, generate a random invertible N×N coefficient matrix
//!   (retrying on singular draws), write it to `INPUT_matr_ID` and
//!   `coded = coef · INPUT` to `INPUT_out_ID`.
//! - `d`: load coefficient matrix `INPUT_matr_ID` and coded file
//!   `INPUT_out_ID`, invert, write `decoded = coef⁻¹ · coded` to
//!   `INPUT_decoded_ID`. A singular matrix is a hard error.

#![forbid(unsafe_code)]

use std::env;
use std::fs;

use rlncore::matrix::{self, Matrix};
use rlncore::prng::{Mt19937, Prng};
use rlncore::source::Source;

fn usage() -> ! {
    eprintln!("usage: rnc-codec INPUT N NCPUS BLOCK_SIZE {{c|d}} ID");
    std::process::exit(2);
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "rnc_codec=info".into()))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 7 {
        usage();
    }
    let input = &args[1];
    let n: usize = args[2].parse().map_err(|_| anyhow::anyhow!("N must be a positive integer"))?;
    let ncpus: usize = args[3].parse().map_err(|_| anyhow::anyhow!("NCPUS must be a positive integer"))?;
    let block_size: usize = args[4].parse().map_err(|_| anyhow::anyhow!("BLOCK_SIZE must be a positive integer"))?;
    let mode = args[5].as_str();
    let id = &args[6];

    matrix::set_ncpus(ncpus);
    matrix::set_block_size(block_size);

    let elem_bytes = std::mem::size_of::<rlncore::Elem>();
    let matr_path = format!("{input}_matr_{id}");
    let out_path = format!("{input}_out_{id}");
    let decoded_path = format!("{input}_decoded_{id}");

    match mode {
        "c" => {
            let bytes = fs::read(input).map_err(|e| anyhow::anyhow!("read {input}: {e}"))?;
            if bytes.len() % (n * elem_bytes) != 0 {
                anyhow::bail!("input file size {} is not a multiple of N*sizeof(E) ({})", bytes.len(), n * elem_bytes);
            }
            let src = Source::from_bytes(&bytes, n)?;

            let mut rng = Mt19937::from_seed(0xC0DE_C0DE);
            let (coef, _inv, retries) = matrix::random_invertible(n, &mut rng);
            tracing::info!(retries, "generated invertible coefficient matrix");

            let mut coded = Matrix::owned(n, src.block_length);
            matrix::pmul(&coef, &src.data, &mut coded)?;

            fs::write(&matr_path, Source::to_bytes(&coef, n * n * elem_bytes)?)?;
            fs::write(&out_path, Source::to_bytes(&coded, n * src.block_length * elem_bytes)?)?;

            println!("Singular matrices generated: {retries}");
        }
        "d" => {
            let matr_bytes = fs::read(&matr_path).map_err(|e| anyhow::anyhow!("read {matr_path}: {e}"))?;
            let coded_bytes = fs::read(&out_path).map_err(|e| anyhow::anyhow!("read {out_path}: {e}"))?;

            if matr_bytes.len() != n * n * elem_bytes {
                anyhow::bail!("coefficient file size does not match N={n}");
            }
            if coded_bytes.len() % (n * elem_bytes) != 0 {
                anyhow::bail!("coded file size is not a multiple of N*sizeof(E)");
            }
            let block_length = coded_bytes.len() / (n * elem_bytes);

            let mut coef = Matrix::from_flat(bytes_to_elems(&matr_bytes), n, n)?;
            let coded = Matrix::from_flat(bytes_to_elems(&coded_bytes), n, block_length)?;

            let mut inv = Matrix::owned(n, n);
            if !matrix::invert(&mut coef, &mut inv)? {
                anyhow::bail!("coefficient matrix is singular, cannot decode");
            }

            let mut decoded = Matrix::owned(n, block_length);
            matrix::pmul(&inv, &coded, &mut decoded)?;

            let mut decoded_flat = vec![0 as rlncore::Elem; n * block_length];
            decoded.flatten_into(&mut decoded_flat)?;
            fs::write(&decoded_path, Source::to_bytes(&decoded, decoded_flat.len() * elem_bytes)?)?;
        }
        _ => usage(),
    }

    Ok(())
}

fn bytes_to_elems(bytes: &[u8]) -> Vec<rlncore::Elem> {
    let elem_bytes = std::mem::size_of::<rlncore::Elem>();
    bytes
        .chunks(elem_bytes)
        .map(|c| {
            let mut buf = [0u8; 2];
            buf[..c.len()].copy_from_slice(c);
            #[cfg(feature = "q256")]
            {
                buf[0]
            }
            #[cfg(not(feature = "q256"))]
            {
                rlncore::Elem::from_le_bytes(buf)
            }
        })
        .collect()
}
