//! Debugger integration
//!
//! A debug session needs three runtime-specific pieces: an environment
//! variable that makes the language runtime listen for (or connect to) a
//! debugger, container overrides publishing the debug port, and an attach
//! configuration the developer pastes into their IDE.

use crate::mount::CODE_DIR;
use fclocal_core::{Runtime, RuntimeFamily};
use serde_json::{json, Value};
use std::path::Path;

/// Host the php runtime connects back to when none is configured
pub const DEFAULT_PHP_REMOTE_HOST: &str = "host.docker.internal";

pub trait DebugConfigGenerator: Send + Sync {
    /// IDE attach configuration for a function listening on `debug_port`
    fn attach_config(
        &self,
        service_name: &str,
        function_name: &str,
        runtime: Runtime,
        source_path: &Path,
        debug_port: u16,
    ) -> Value;

    /// Environment variable enabling the runtime's debug protocol, if it has one
    fn debug_env(&self, runtime: Runtime, debug_port: u16) -> Option<String>;

    /// Fragment merged over the base container options
    fn container_overrides(&self, runtime: Runtime, debug_port: u16) -> Value;
}

/// Generates VS Code `launch.json` attach configurations
#[derive(Debug, Clone)]
pub struct VscodeDebugGenerator {
    php_remote_host: String,
}

impl Default for VscodeDebugGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PHP_REMOTE_HOST)
    }
}

impl VscodeDebugGenerator {
    pub fn new(php_remote_host: impl Into<String>) -> Self {
        Self {
            php_remote_host: php_remote_host.into(),
        }
    }
}

impl DebugConfigGenerator for VscodeDebugGenerator {
    fn attach_config(
        &self,
        service_name: &str,
        function_name: &str,
        runtime: Runtime,
        source_path: &Path,
        debug_port: u16,
    ) -> Value {
        let name = format!("fc/{service_name}/{function_name}");
        let local_root = source_path.display().to_string();

        let configuration = match runtime {
            Runtime::Nodejs6 | Runtime::Nodejs8 => json!({
                "name": name,
                "type": "node",
                "request": "attach",
                "address": "localhost",
                "port": debug_port,
                "localRoot": local_root,
                "remoteRoot": CODE_DIR,
                "protocol": if runtime == Runtime::Nodejs6 { "legacy" } else { "inspector" },
                "stopOnEntry": false,
            }),
            Runtime::Python27 | Runtime::Python3 => json!({
                "name": name,
                "type": "python",
                "request": "attach",
                "host": "localhost",
                "port": debug_port,
                "pathMappings": [
                    { "localRoot": local_root, "remoteRoot": CODE_DIR }
                ],
            }),
            Runtime::Java8 => json!({
                "name": name,
                "type": "java",
                "request": "attach",
                "hostName": "localhost",
                "port": debug_port,
            }),
            Runtime::Php72 => json!({
                "name": name,
                "type": "php",
                "request": "launch",
                "port": debug_port,
                "stopOnEntry": false,
                "pathMappings": { CODE_DIR: local_root },
                "ignore": ["/var/fc/runtime/**"],
            }),
        };

        json!({
            "version": "0.2.0",
            "configurations": [configuration],
        })
    }

    fn debug_env(&self, runtime: Runtime, debug_port: u16) -> Option<String> {
        let env = match runtime {
            Runtime::Nodejs6 => format!("DEBUG_OPTIONS=--debug-brk={debug_port}"),
            Runtime::Nodejs8 => format!("DEBUG_OPTIONS=--inspect-brk=0.0.0.0:{debug_port}"),
            Runtime::Python27 | Runtime::Python3 => {
                format!("DEBUG_OPTIONS=-m ptvsd --host 0.0.0.0 --port {debug_port} --wait")
            }
            Runtime::Java8 => format!(
                "DEBUG_OPTIONS=-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,quiet=y,address={debug_port}"
            ),
            Runtime::Php72 => format!(
                "XDEBUG_CONFIG=remote_enable=1 remote_autostart=1 remote_port={debug_port} remote_host={}",
                self.php_remote_host
            ),
        };
        Some(env)
    }

    fn container_overrides(&self, runtime: Runtime, debug_port: u16) -> Value {
        // xdebug dials out to the IDE, nothing to publish
        if runtime.family() == RuntimeFamily::Php {
            return json!({});
        }

        let exposed = format!("{debug_port}/tcp");
        json!({
            "ExposedPorts": { exposed.clone(): {} },
            "HostConfig": {
                "PortBindings": {
                    exposed: [{ "HostIp": "", "HostPort": debug_port.to_string() }]
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_env_per_runtime() {
        let generator = VscodeDebugGenerator::default();

        assert_eq!(
            generator.debug_env(Runtime::Nodejs8, 9229).as_deref(),
            Some("DEBUG_OPTIONS=--inspect-brk=0.0.0.0:9229")
        );
        assert_eq!(
            generator.debug_env(Runtime::Nodejs6, 5858).as_deref(),
            Some("DEBUG_OPTIONS=--debug-brk=5858")
        );
        assert!(generator
            .debug_env(Runtime::Java8, 5005)
            .unwrap()
            .contains("-agentlib:jdwp=transport=dt_socket,server=y,suspend=y"));
        assert_eq!(
            generator.debug_env(Runtime::Php72, 9000).as_deref(),
            Some("XDEBUG_CONFIG=remote_enable=1 remote_autostart=1 remote_port=9000 remote_host=host.docker.internal")
        );
    }

    #[test]
    fn test_container_overrides_publish_port() {
        let generator = VscodeDebugGenerator::default();
        let overrides = generator.container_overrides(Runtime::Python3, 3000);

        assert_eq!(overrides["ExposedPorts"]["3000/tcp"], json!({}));
        assert_eq!(
            overrides["HostConfig"]["PortBindings"]["3000/tcp"][0]["HostPort"],
            "3000"
        );
    }

    #[test]
    fn test_php_has_no_overrides() {
        let generator = VscodeDebugGenerator::new("10.0.0.2");
        assert_eq!(generator.container_overrides(Runtime::Php72, 9000), json!({}));
        assert!(generator
            .debug_env(Runtime::Php72, 9000)
            .unwrap()
            .ends_with("remote_host=10.0.0.2"));
    }

    #[test]
    fn test_attach_config_nodejs8() {
        let generator = VscodeDebugGenerator::default();
        let config = generator.attach_config(
            "localdemo",
            "hello",
            Runtime::Nodejs8,
            Path::new("/project/hello"),
            9229,
        );

        assert_eq!(config["version"], "0.2.0");
        let entry = &config["configurations"][0];
        assert_eq!(entry["name"], "fc/localdemo/hello");
        assert_eq!(entry["type"], "node");
        assert_eq!(entry["protocol"], "inspector");
        assert_eq!(entry["port"], 9229);
        assert_eq!(entry["localRoot"], "/project/hello");
        assert_eq!(entry["remoteRoot"], "/code");
    }

    #[test]
    fn test_attach_config_php_path_mapping() {
        let generator = VscodeDebugGenerator::default();
        let config = generator.attach_config(
            "svc",
            "fn",
            Runtime::Php72,
            Path::new("/project/php"),
            9000,
        );

        let entry = &config["configurations"][0];
        assert_eq!(entry["request"], "launch");
        assert_eq!(entry["pathMappings"]["/code"], "/project/php");
    }
}
