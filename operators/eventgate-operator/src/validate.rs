//! 网关校验

use crate::crd::{DispatchMechanism, Gateway};
use crate::error::{Error, Result};

/// 校验网关定义的必填字段
///
/// 校验失败时协调流程直接返回，不会产生任何写操作。
pub fn validate(gateway: &Gateway) -> Result<()> {
    let spec = &gateway.spec;

    if spec.deploy_spec.is_none() {
        return Err(Error::Validation("未指定网关部署规范".to_string()));
    }
    if spec.gateway_type.is_empty() {
        return Err(Error::Validation("未指定网关类型".to_string()));
    }
    if spec.version.is_empty() {
        return Err(Error::Validation("未指定网关版本".to_string()));
    }

    match spec.dispatch_mechanism {
        DispatchMechanism::Http => {
            if spec.watchers.as_ref().map_or(true, |w| w.is_empty()) {
                return Err(Error::Validation("网关没有关联的监听方".to_string()));
            }
        }
        DispatchMechanism::Nats | DispatchMechanism::Kafka => {}
    }

    Ok(())
}
