use gridmapper_core::{derive_positions, RngParams};

fn main() -> gridmapper_core::Result<()> {
    // Example end-to-end derivation
    let params = RngParams::new("example-server-seed", "example-client-seed", 1)?;
    let layout = derive_positions(&params, 5)?;
    println!(
        "server_seed_hash={} nonce={} mines={}",
        params.server_seed_hash_hex(),
        params.nonce(),
        layout
    );
    for row in layout.grid() {
        let line: String = row.iter().map(|&m| if m { '*' } else { '.' }).collect();
        println!("{line}");
    }
    Ok(())
}
