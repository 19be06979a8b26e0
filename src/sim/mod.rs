/// 模拟后端 (Simulation backends)
///
/// - SimulatedVehicle: 确定性飞行器模型,实现 FlightActuator,支持故障注入
/// - SyntheticCamera / WanderingPersonDetector: 无硬件时的帧来源与检测器
/// - ScriptedDetector: 测试用的检测结果回放
pub mod camera;
pub mod vehicle;

pub use camera::{ScriptedDetector, SyntheticCamera, WanderingPersonDetector};
pub use vehicle::{SimConfig, SimulatedVehicle, VehicleHandle};
