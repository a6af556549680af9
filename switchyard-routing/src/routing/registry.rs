use anyhow::Result;
use std::collections::HashMap;
use switchyard_core::config::model::validate_experts;
use switchyard_core::ExpertDefinition;

/// 专家注册表
///
/// 启动时由配置构建，运行期只读；热替换时整体替换
#[derive(Debug, Clone)]
pub struct ExpertRegistry {
    experts: Vec<ExpertDefinition>,
    index: HashMap<String, usize>,
}

impl ExpertRegistry {
    /// 创建注册表，非法的专家定义在这里被拒绝
    pub fn new(experts: Vec<ExpertDefinition>) -> Result<Self> {
        validate_experts(&experts)?;

        let index = experts
            .iter()
            .enumerate()
            .map(|(position, expert)| (expert.id.clone(), position))
            .collect();

        tracing::debug!("Built expert registry with {} experts", experts.len());
        Ok(Self { experts, index })
    }

    pub fn get(&self, expert_id: &str) -> Option<&ExpertDefinition> {
        self.index.get(expert_id).map(|&position| &self.experts[position])
    }

    pub fn all(&self) -> &[ExpertDefinition] {
        &self.experts
    }

    pub fn contains(&self, expert_id: &str) -> bool {
        self.index.contains_key(expert_id)
    }

    /// 声明支持指定请求类型的专家
    pub fn supporting<'a>(
        &'a self,
        request_type: &'a str,
    ) -> impl Iterator<Item = &'a ExpertDefinition> + 'a {
        self.experts
            .iter()
            .filter(move |expert| expert.capabilities.supports(request_type))
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }
}
