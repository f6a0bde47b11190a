pub mod db;
pub mod detect;
pub mod kubeconfig;
pub mod providers;
pub mod scaling;
pub mod settings;
