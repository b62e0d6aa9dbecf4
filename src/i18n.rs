use std::collections::HashMap;

pub struct I18n {
    translations: HashMap<String, HashMap<String, String>>,
    current_lang: String,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let mut translations = HashMap::new();

        // 英文
        let mut en = HashMap::new();
        en.insert("task_created".to_string(), "Task created: {0}".to_string());
        en.insert("task_updated".to_string(), "Task updated: {0}".to_string());
        en.insert("task_deleted".to_string(), "Task deleted: {0}".to_string());
        en.insert("task_not_found".to_string(), "Task not found: {0}".to_string());
        en.insert("no_tasks".to_string(), "No tasks registered".to_string());
        en.insert("no_name_match".to_string(), "No task name contains \"{0}\"".to_string());
        en.insert("rejected".to_string(), "Rejected: {0}".to_string());
        en.insert("task_line".to_string(), "{0}  {1} (owner: {2}, runs: {3})".to_string());
        en.insert("field_command".to_string(), "Command".to_string());
        en.insert("field_owner".to_string(), "Owner".to_string());
        en.insert("field_runs".to_string(), "Runs".to_string());
        en.insert("executing".to_string(), "Executing {0}...".to_string());
        en.insert("execution_recorded".to_string(), "Execution recorded ({0} in history)".to_string());
        en.insert("execution_header".to_string(), "#{0}  {1} -> {2}  ({3}ms, exit code: {4})".to_string());
        en.insert("exit_code_none".to_string(), "-".to_string());
        en.insert("output".to_string(), "Output:".to_string());
        en.insert("no_executions".to_string(), "No executions yet".to_string());
        en.insert("history_truncated".to_string(), "(showing {0} of {1} executions)".to_string());
        en.insert("error_open_store".to_string(), "Failed to open task store".to_string());

        // 中文
        let mut zh = HashMap::new();
        zh.insert("task_created".to_string(), "任务已创建: {0}".to_string());
        zh.insert("task_updated".to_string(), "任务已更新: {0}".to_string());
        zh.insert("task_deleted".to_string(), "任务已删除: {0}".to_string());
        zh.insert("task_not_found".to_string(), "未找到任务: {0}".to_string());
        zh.insert("no_tasks".to_string(), "尚未注册任何任务".to_string());
        zh.insert("no_name_match".to_string(), "没有名称包含 \"{0}\" 的任务".to_string());
        zh.insert("rejected".to_string(), "已拒绝: {0}".to_string());
        zh.insert("task_line".to_string(), "{0}  {1} (所有者: {2}, 执行次数: {3})".to_string());
        zh.insert("field_command".to_string(), "命令".to_string());
        zh.insert("field_owner".to_string(), "所有者".to_string());
        zh.insert("field_runs".to_string(), "执行次数".to_string());
        zh.insert("executing".to_string(), "正在执行 {0}...".to_string());
        zh.insert("execution_recorded".to_string(), "执行已记录 (历史共 {0} 条)".to_string());
        zh.insert("execution_header".to_string(), "#{0}  {1} -> {2}  ({3}ms, 退出码: {4})".to_string());
        zh.insert("exit_code_none".to_string(), "-".to_string());
        zh.insert("output".to_string(), "输出:".to_string());
        zh.insert("no_executions".to_string(), "暂无执行记录".to_string());
        zh.insert("history_truncated".to_string(), "(显示 {1} 条中的 {0} 条)".to_string());
        zh.insert("error_open_store".to_string(), "打开任务存储失败".to_string());

        translations.insert("en".to_string(), en);
        translations.insert("zh".to_string(), zh);

        // 确定语言 - 支持多种语言代码格式
        let effective_lang = if lang.starts_with("zh") || lang == "cn" || lang == "chinese" {
            "zh"
        } else {
            "en"
        };

        Self {
            translations,
            current_lang: effective_lang.to_string(),
        }
    }

    pub fn t(&self, key: &str) -> String {
        if let Some(lang_map) = self.translations.get(&self.current_lang) {
            if let Some(value) = lang_map.get(key) {
                return value.clone();
            }
        }
        key.to_string()
    }

    pub fn t_format(&self, key: &str, args: &[&str]) -> String {
        let template = self.t(key);
        let mut result = template;
        for (i, arg) in args.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), arg);
        }
        result
    }
}
