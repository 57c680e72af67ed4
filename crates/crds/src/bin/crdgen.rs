//! Prints the BootModuleConfig CRD as YAML.
//!
//! Useful on clusters where KMM is not installed yet and the e2e suite only
//! needs the API type registered: `cargo run -p crds --bin crdgen | oc apply -f -`

use crds::BootModuleConfig;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&BootModuleConfig::crd())?);
    Ok(())
}
