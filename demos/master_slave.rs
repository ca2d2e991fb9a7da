//! Master-Slave Evaluation
//!
//! One population on the master, fitness evaluations farmed out to slaves
//! over the task queue of the in-process broker.

use std::sync::Arc;
use std::time::Duration;

use fugue_archipelago::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Master-Slave Evaluation ===\n");

    const DIM: usize = 8;
    let broker = Arc::new(InMemoryBroker::new());
    let runner = AlgorithmRunner::new(broker.clone())
        .with_settings(EngineSettings::default().with_seed(7).with_elitism(2));

    let params = MasterSlaveParams {
        population_size: 60,
        chromosome_size: DIM,
        number_of_generations: 50,
        num_workers: 4,
        broker: BrokerConfig::default().with_topic_prefix("demo.ms"),
    };

    // A deliberately slow objective, the case master-slave is meant for
    let slow_sphere = |genes: &[f64]| {
        std::thread::sleep(Duration::from_micros(200));
        Sphere.evaluate(genes)
    };

    println!("Problem: {}-D Sphere, {} workers", DIM, params.num_workers);
    let result = runner.run_master_slave(&params, slow_sphere)?;

    let (genes, fitness) = result.best();
    println!("\nResults:");
    println!("  Best fitness: {:.6}", fitness);
    println!("  Generations:  {}", result.generations_run);
    println!("  Best genes:   {:?}", genes);
    println!("  Open connections after run: {}", broker.open_connections());
    Ok(())
}
