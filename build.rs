use vergen::EmitBuilder;

fn main() {
    // 生成构建信息；不在 git 仓库里时退化为默认值，不阻塞构建
    if let Err(e) = EmitBuilder::builder().all_build().all_git().emit() {
        println!("cargo:warning=构建信息生成失败: {}", e);
    }
}
