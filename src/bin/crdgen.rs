use kube::CustomResourceExt;
use pgfleet::crd::{PgCluster, PgDbOps};

fn main() {
    print!("{}", serde_yaml::to_string(&PgCluster::crd()).unwrap());
    println!("---");
    print!("{}", serde_yaml::to_string(&PgDbOps::crd()).unwrap());
}
