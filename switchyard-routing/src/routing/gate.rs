use std::collections::HashMap;
use switchyard_core::ToolRequest;

/// 总开关
pub const MASTER_FLAG: &str = "expert_routing";

/// 按请求类型的开关名
pub fn request_type_flag(request_type: &str) -> String {
    format!("{}.{}", MASTER_FLAG, request_type)
}

/// 按调用方等级的开关名
pub fn tier_flag(tier: &str) -> String {
    format!("{}.tier.{}", MASTER_FLAG, tier)
}

/// 灰度开关：是否对该请求启用专家路由
///
/// 检查顺序：总开关未开启 → false；类型开关显式关闭 → false；
/// 等级开关存在且关闭 → false；其余情况 → true。
/// 总开关缺省视为关闭，类型和等级开关缺省视为开启。
pub fn should_use_routing(
    request_type: &str,
    flags: &HashMap<String, bool>,
    tier: Option<&str>,
) -> bool {
    if !flags.get(MASTER_FLAG).copied().unwrap_or(false) {
        return false;
    }

    if flags.get(&request_type_flag(request_type)) == Some(&false) {
        return false;
    }

    if let Some(tier) = tier {
        if flags.get(&tier_flag(tier)) == Some(&false) {
            return false;
        }
    }

    true
}

/// 结合请求自带的元数据判断
///
/// 请求元数据里的开关覆盖全局开关，等级取自元数据
pub fn should_route_request(request: &ToolRequest, global_flags: &HashMap<String, bool>) -> bool {
    let Some(metadata) = request.metadata.as_ref() else {
        return should_use_routing(&request.request_type, global_flags, None);
    };

    if metadata.feature_flags.is_empty() {
        return should_use_routing(&request.request_type, global_flags, metadata.tier.as_deref());
    }

    let mut merged = global_flags.clone();
    merged.extend(
        metadata
            .feature_flags
            .iter()
            .map(|(name, enabled)| (name.clone(), *enabled)),
    );
    should_use_routing(&request.request_type, &merged, metadata.tier.as_deref())
}
