use kube::CustomResourceExt;

fn main() {
    let crds = vec![debugsess_operator::crds::DebugSession::crd()];
    print!("{}", serde_yaml::to_string(&crds).unwrap());
}
