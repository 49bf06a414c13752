use reelsync_core::{spin_once, EngineParams, GameConfig, SeededRng};

fn main() {
    // Replay a short seeded session against the default machine
    let mut rng = SeededRng::new("example-server-seed", "example-client-seed", 1);
    let params = EngineParams::from_config(&GameConfig::default());
    println!("server_seed_hash={}", rng.seed_hash());
    for round in 1..=5 {
        let outcome = spin_once(&mut rng, &params, 1.0);
        println!(
            "round={} targets={:?} multiplier=x{} payout={:.2}",
            round, outcome.targets, outcome.multiplier, outcome.payout
        );
    }
}
