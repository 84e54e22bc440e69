use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_assembler::{BatchAssembler, ChannelEvent, ChannelHandler};
use relay_bridge::{BridgeOrchestrator, RecordConsumer, RecordPublisher};
use relay_core::{
    AppConfig, BatchStore, DispatchQueue, Mailer, RelayBroker, Repository,
};
use relay_dispatch::{DispatchPoller, EmailProcessor, RateLimiter};
use relay_infrastructure::{
    LoggingMailer, MemoryBatchStore, MemoryBroker, MemoryDispatchQueue, MemoryRepository,
    RedisBatchStore, RedisConnectionManager, RedisDispatchQueue, RedisStreamBroker,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 存储后端选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Redis哈希/列表/流
    Redis,
    /// 进程内实现，单机运行与演示用
    Memory,
}

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 从标准输入读取通道事件，装配并转运批次
    Ingest,
    /// 排空派发队列
    Dispatch,
    /// 先摄取后排空
    All,
}

/// 显式装配的依赖上下文，不使用任何全局状态
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn BatchStore>,
    pub queue: Arc<dyn DispatchQueue>,
    pub broker: Arc<dyn RelayBroker>,
    pub repository: Arc<dyn Repository>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppContext {
    /// 按后端选择装配全部协作者
    ///
    /// 仓储与邮件发送目前始终使用内建实现，Redis后端只接管
    /// 批次存储、派发队列与中继主题。
    pub async fn build(config: AppConfig, backend: Backend) -> Result<Self> {
        let (store, queue, broker): (
            Arc<dyn BatchStore>,
            Arc<dyn DispatchQueue>,
            Arc<dyn RelayBroker>,
        ) = match backend {
            Backend::Redis => {
                let manager = Arc::new(
                    RedisConnectionManager::new(config.redis.clone())
                        .await
                        .context("连接Redis失败")?,
                );
                (
                    Arc::new(RedisBatchStore::new(Arc::clone(&manager))),
                    Arc::new(RedisDispatchQueue::new(
                        Arc::clone(&manager),
                        config.poller.queue_name.clone(),
                        config.poller.max_queue_size,
                    )),
                    Arc::new(RedisStreamBroker::new(manager)),
                )
            }
            Backend::Memory => (
                Arc::new(MemoryBatchStore::new()),
                Arc::new(MemoryDispatchQueue::new(
                    config.poller.queue_name.clone(),
                    config.poller.max_queue_size,
                )),
                Arc::new(MemoryBroker::new()),
            ),
        };

        Ok(Self {
            config,
            store,
            queue,
            broker,
            repository: Arc::new(MemoryRepository::new()),
            mailer: Arc::new(LoggingMailer::new()),
        })
    }
}

/// 应用实例
pub struct Application {
    context: AppContext,
    mode: AppMode,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode, backend: Backend) -> Result<Self> {
        let context = AppContext::build(config, backend).await?;
        Ok(Self { context, mode })
    }

    /// 按模式运行直到完成或收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match self.mode {
            AppMode::Ingest => self.run_ingest(shutdown_rx).await,
            AppMode::Dispatch => self.run_dispatch(shutdown_rx).await,
            AppMode::All => {
                self.run_ingest(shutdown_rx.resubscribe()).await?;
                self.run_dispatch(shutdown_rx).await
            }
        }
    }

    /// 摄取模式：标准输入每行一个JSON通道事件，应答写回标准输出。
    /// complete事件产出的记录立即经中继桥转运落库。
    async fn run_ingest(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let assembler = Arc::new(BatchAssembler::new(
            Arc::clone(&self.context.store),
            self.context.config.batch.clone(),
        ));
        let handler = ChannelHandler::new(assembler);

        let publisher = RecordPublisher::new(
            Arc::clone(&self.context.broker),
            self.context.config.broker.topic.clone(),
        );
        let consumer = Arc::new(RecordConsumer::new(
            Arc::clone(&self.context.broker),
            Arc::clone(&self.context.repository),
            Arc::clone(&self.context.queue),
            self.context.config.broker.topic.clone(),
            Duration::from_millis(self.context.config.broker.consume_interval_ms),
        ));
        let orchestrator = BridgeOrchestrator::new(publisher, consumer);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        info!("摄取模式就绪，等待通道事件");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("读取标准输入失败")?,
                _ = shutdown_rx.recv() => {
                    info!("摄取模式收到关闭信号");
                    return Ok(());
                }
            };
            let Some(line) = line else {
                info!("输入结束，摄取模式退出");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            let event: ChannelEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "通道事件解析失败");
                    continue;
                }
            };

            let handled = handler.handle(event).await;
            let reply = serde_json::to_string(&handled.reply)?;
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;

            if let Some(records) = handled.records {
                match orchestrator.relay(records).await {
                    Ok(report) => info!(
                        resolved = report.resolved,
                        enqueued = report.enqueued,
                        "批次已转运"
                    ),
                    Err(e) => error!(error = %e, "批次转运失败"),
                }
            }
        }
    }

    /// 排空模式：运行轮询器直到自行终止，关闭信号转为stop请求
    async fn run_dispatch(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let rate_limiter = Arc::new(RateLimiter::new(&self.context.config.rate_limits));
        let processor = Arc::new(EmailProcessor::new(
            Arc::clone(&self.context.repository),
            Arc::clone(&self.context.mailer),
            Arc::clone(&rate_limiter),
            self.context.config.mailer.clone(),
        ));
        let poller = Arc::new(DispatchPoller::new(
            Arc::clone(&self.context.queue),
            processor,
            rate_limiter,
            self.context.config.retry_policy.clone(),
            self.context.config.poller.clone(),
        ));

        let stopper = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move {
                if shutdown_rx.recv().await.is_ok() {
                    poller.stop();
                }
            })
        };

        let report = poller.run().await?;
        stopper.abort();

        info!(
            status = ?report.status,
            processed = report.processed_count,
            duration_ms = report.duration_ms,
            error = report.error.as_deref().unwrap_or("-"),
            "排空报告"
        );
        Ok(())
    }
}
